//! Domain types for the banking demo.
//!
//! - Accounts identified by their number (the routing key)
//! - Commands routed to the account they act on
//! - Reports printed back to the teller's user

use demandbus_core::{Routed, RoutingKey, SmallVec, smallvec};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single bank account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account number
    pub number: RoutingKey,
    /// Current balance
    pub balance: Decimal,
}

impl Account {
    /// Creates an account holding `balance`
    #[must_use]
    pub const fn new(number: RoutingKey, balance: Decimal) -> Self {
        Self { number, balance }
    }

    /// Creates an empty account
    #[must_use]
    pub const fn opened(number: RoutingKey) -> Self {
        Self::new(number, Decimal::ZERO)
    }
}

/// Commands applied to accounts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankCommand {
    /// Report the balance of `account`
    QueryBalance {
        /// Account to read
        account: RoutingKey,
    },

    /// Debit `from` and, if funds allow, credit `to`
    StartTransfer {
        /// Sending account (the routing key)
        from: RoutingKey,
        /// Receiving account
        to: RoutingKey,
        /// Amount to move
        amount: Decimal,
    },

    /// Credit `to` with the amount debited by a `StartTransfer`
    FinishTransfer {
        /// Sending account, refunded if the credit cannot be applied
        from: RoutingKey,
        /// Receiving account (the routing key)
        to: RoutingKey,
        /// Amount to credit
        amount: Decimal,
    },

    /// Return a debited amount to its sender after a refused credit
    RefundTransfer {
        /// Sending account (the routing key)
        account: RoutingKey,
        /// Amount to return
        amount: Decimal,
    },
}

impl BankCommand {
    /// Balance query for `account`
    #[must_use]
    pub fn query_balance(account: impl Into<RoutingKey>) -> Self {
        Self::QueryBalance {
            account: account.into(),
        }
    }

    /// First half of a transfer, routed to the sender
    #[must_use]
    pub fn start_transfer(
        from: impl Into<RoutingKey>,
        to: impl Into<RoutingKey>,
        amount: Decimal,
    ) -> Self {
        Self::StartTransfer {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    /// Second half of a transfer, routed to the receiver
    #[must_use]
    pub fn finish_transfer(
        from: impl Into<RoutingKey>,
        to: impl Into<RoutingKey>,
        amount: Decimal,
    ) -> Self {
        Self::FinishTransfer {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    /// Compensation for a credit the receiver refused, routed to the sender
    #[must_use]
    pub fn refund_transfer(account: impl Into<RoutingKey>, amount: Decimal) -> Self {
        Self::RefundTransfer {
            account: account.into(),
            amount,
        }
    }
}

impl Routed for BankCommand {
    fn routing_key(&self) -> &RoutingKey {
        match self {
            Self::QueryBalance { account } | Self::RefundTransfer { account, .. } => account,
            Self::StartTransfer { from, .. } => from,
            Self::FinishTransfer { to, .. } => to,
        }
    }

    fn footprint(&self) -> SmallVec<[RoutingKey; 2]> {
        match self {
            // Both sides are held so no one sees the money in flight
            Self::StartTransfer { from, to, .. } => smallvec![from.clone(), to.clone()],
            Self::QueryBalance { account } | Self::RefundTransfer { account, .. } => {
                smallvec![account.clone()]
            }
            Self::FinishTransfer { to, .. } => smallvec![to.clone()],
        }
    }
}

/// User-visible outcomes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankReport {
    /// Current balance of an account
    Balance {
        /// Account number
        account: RoutingKey,
        /// Balance at the time of the query
        balance: Decimal,
    },

    /// A transfer was refused for lack of funds
    InsufficientFunds {
        /// Sending account
        account: RoutingKey,
        /// Amount asked for
        requested: Decimal,
        /// Balance at the time of the attempt
        available: Decimal,
    },

    /// A transfer named a zero or negative amount
    InvalidAmount {
        /// The amount given
        amount: Decimal,
    },

    /// Applying the amount would overflow a balance or round it
    PrecisionExceeded {
        /// Account whose balance could not hold the result
        account: RoutingKey,
        /// The amount given
        amount: Decimal,
    },
}

impl std::fmt::Display for BankReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Balance { account, balance } => {
                write!(f, "Account {account} balance is {balance}")
            }
            Self::InsufficientFunds { .. } => write!(f, "Not enough funds"),
            Self::InvalidAmount { amount } => write!(f, "Amount must be positive, got {amount}"),
            Self::PrecisionExceeded { account, amount } => write!(
                f,
                "Account {account} cannot hold the result of moving {amount} exactly"
            ),
        }
    }
}
