//! Account command handler.
//!
//! Applies balance queries and both halves of a transfer to one account.
//!
//! Balances only change by exact arithmetic. A debit or credit whose result
//! would overflow, or need more digits than a balance holds, is refused with
//! [`BankReport::PrecisionExceeded`]. A refused credit publishes a refund so
//! the sender gets its money back within the same chain.

use crate::types::{Account, BankCommand, BankReport};
use demandbus_core::{CommandHandler, Effect, SmallVec, smallvec};
use rust_decimal::Decimal;

/// Handler for bank accounts
#[derive(Clone, Copy, Debug, Default)]
pub struct AccountHandler;

impl AccountHandler {
    /// Creates a new `AccountHandler`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// `balance - amount`, or `None` if the result overflows or was rounded
fn exact_sub(balance: Decimal, amount: Decimal) -> Option<Decimal> {
    let result = balance.checked_sub(amount)?;
    (result.checked_add(amount)? == balance && balance.checked_sub(result)? == amount)
        .then_some(result)
}

/// `balance + amount`, or `None` if the result overflows or was rounded
fn exact_add(balance: Decimal, amount: Decimal) -> Option<Decimal> {
    let result = balance.checked_add(amount)?;
    (result.checked_sub(amount)? == balance && result.checked_sub(balance)? == amount)
        .then_some(result)
}

fn precision_exceeded(account: &Account, amount: Decimal) -> Effect<BankCommand, BankReport> {
    tracing::warn!(
        account = %account.number,
        %amount,
        balance = %account.balance,
        "Balance cannot hold the result exactly"
    );
    Effect::Report(BankReport::PrecisionExceeded {
        account: account.number.clone(),
        amount,
    })
}

impl CommandHandler for AccountHandler {
    type State = Account;
    type Command = BankCommand;
    type Report = BankReport;

    fn handle(
        &self,
        account: &mut Account,
        command: BankCommand,
    ) -> SmallVec<[Effect<BankCommand, BankReport>; 4]> {
        match command {
            BankCommand::QueryBalance { .. } => smallvec![Effect::Report(BankReport::Balance {
                account: account.number.clone(),
                balance: account.balance,
            })],

            BankCommand::StartTransfer { from, to, amount } => {
                if amount <= Decimal::ZERO {
                    return smallvec![Effect::Report(BankReport::InvalidAmount { amount })];
                }

                if account.balance < amount {
                    tracing::debug!(
                        account = %account.number,
                        %amount,
                        balance = %account.balance,
                        "Transfer refused"
                    );
                    return smallvec![Effect::Report(BankReport::InsufficientFunds {
                        account: account.number.clone(),
                        requested: amount,
                        available: account.balance,
                    })];
                }

                let Some(debited) = exact_sub(account.balance, amount) else {
                    return smallvec![precision_exceeded(account, amount)];
                };
                account.balance = debited;
                smallvec![Effect::Publish(BankCommand::finish_transfer(from, to, amount))]
            }

            BankCommand::FinishTransfer { from, amount, .. } => {
                match exact_add(account.balance, amount) {
                    Some(credited) => {
                        account.balance = credited;
                        smallvec![Effect::None]
                    }
                    None => smallvec![
                        precision_exceeded(account, amount),
                        Effect::Publish(BankCommand::refund_transfer(from, amount)),
                    ],
                }
            }

            BankCommand::RefundTransfer { amount, .. } => {
                match exact_add(account.balance, amount) {
                    Some(credited) => {
                        account.balance = credited;
                        smallvec![Effect::None]
                    }
                    None => smallvec![precision_exceeded(account, amount)],
                }
            }
        }
    }
}
