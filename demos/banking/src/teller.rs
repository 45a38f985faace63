//! Line-oriented teller.
//!
//! Parses one instruction per line, publishes the matching command and turns
//! the delivery into the lines shown to the user.
//!
//! | Input | Effect |
//! |---|---|
//! | `balance <account>` | `Account <account> balance is <amount>` |
//! | `transfer <from> <to> <amount>` | silent on success, `Not enough funds` otherwise |
//! | `create <account>` | opens an empty account, `Account already exists` if taken |
//! | `exit` | stops the session |
//!
//! A transfer naming an account that does not exist prints
//! `Account <account> not found` and is never published. The bus itself would
//! debit a registered sender and drop the credit to a missing receiver, so
//! the teller checks both sides first.

use crate::types::{Account, BankCommand, BankReport};
use demandbus_core::{BusError, CommandBus, RoutingKey};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Printed after any line that does not parse
pub const USAGE: &str =
    "Usage: balance <account> | transfer <from> <to> <amount> | create <account> | exit";

/// Any bus carrying bank commands
pub type BankBus = dyn CommandBus<Command = BankCommand, State = Account, Report = BankReport>;

/// Errors from parsing a teller line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Blank line
    #[error("Empty instruction")]
    Empty,

    /// First word is not an instruction
    #[error("Unknown instruction '{0}'")]
    UnknownVerb(String),

    /// Wrong number of arguments
    #[error("'{verb}' takes {expected} argument(s), got {found}")]
    Arity {
        /// The instruction
        verb: &'static str,
        /// Arguments it takes
        expected: usize,
        /// Arguments given
        found: usize,
    },

    /// Amount is not a decimal number
    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),

    /// Amount is zero or negative
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
}

/// One parsed teller line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `balance <account>`
    Balance(RoutingKey),
    /// `transfer <from> <to> <amount>`
    Transfer {
        /// Sending account
        from: RoutingKey,
        /// Receiving account
        to: RoutingKey,
        /// Amount to move
        amount: Decimal,
    },
    /// `create <account>`
    Create(RoutingKey),
    /// `exit`
    Exit,
}

impl FromStr for Instruction {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Err(ParseError::Empty);
        };

        let arity = |verb: &'static str, expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(ParseError::Arity {
                    verb,
                    expected,
                    found: args.len(),
                })
            }
        };

        match verb {
            "balance" => {
                arity("balance", 1)?;
                Ok(Self::Balance(RoutingKey::new(args[0])))
            }
            "transfer" => {
                arity("transfer", 3)?;
                let amount = Decimal::from_str(args[2])
                    .map_err(|_| ParseError::InvalidAmount(args[2].to_string()))?;
                if amount <= Decimal::ZERO {
                    return Err(ParseError::NonPositiveAmount(amount));
                }
                Ok(Self::Transfer {
                    from: RoutingKey::new(args[0]),
                    to: RoutingKey::new(args[1]),
                    amount,
                })
            }
            "create" => {
                arity("create", 1)?;
                Ok(Self::Create(RoutingKey::new(args[0])))
            }
            "exit" => {
                arity("exit", 0)?;
                Ok(Self::Exit)
            }
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

/// What the session should do after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Print these lines and read the next instruction
    Continue(Vec<String>),
    /// End the session
    Exit,
}

/// Interprets teller lines against a bank bus.
#[derive(Clone)]
pub struct Teller {
    bus: Arc<BankBus>,
}

impl Teller {
    /// Creates a teller over `bus`
    #[must_use]
    pub fn new(bus: Arc<BankBus>) -> Self {
        Self { bus }
    }

    /// Handle one input line
    #[tracing::instrument(skip(self))]
    pub async fn execute(&self, line: &str) -> Outcome {
        match line.parse::<Instruction>() {
            Ok(Instruction::Exit) => Outcome::Exit,
            Ok(instruction) => Outcome::Continue(self.apply(instruction).await),
            Err(ParseError::Empty) => Outcome::Continue(Vec::new()),
            Err(err) => {
                tracing::debug!(%err, "Rejected instruction");
                Outcome::Continue(vec![err.to_string(), USAGE.to_string()])
            }
        }
    }

    async fn apply(&self, instruction: Instruction) -> Vec<String> {
        match instruction {
            Instruction::Balance(account) => {
                self.publish(BankCommand::query_balance(account.clone()), &account)
                    .await
            }
            Instruction::Transfer { from, to, amount } => {
                for account in [&from, &to] {
                    if !self.bus.contains(account).await {
                        tracing::debug!(%account, "Transfer names a missing account");
                        return vec![not_found(account)];
                    }
                }
                let sender = from.clone();
                self.publish(BankCommand::start_transfer(from, to, amount), &sender)
                    .await
            }
            Instruction::Create(account) => {
                match self
                    .bus
                    .register(account.clone(), Account::opened(account.clone()))
                    .await
                {
                    Ok(()) => {
                        tracing::info!(%account, "Account created");
                        Vec::new()
                    }
                    Err(BusError::AlreadyExists(_)) => vec!["Account already exists".to_string()],
                    Err(err) => vec![err.to_string()],
                }
            }
            Instruction::Exit => Vec::new(),
        }
    }

    /// Publish `command`, routed to `account`; if nothing was applied, say the
    /// account does not exist.
    async fn publish(&self, command: BankCommand, account: &RoutingKey) -> Vec<String> {
        match self.bus.publish(command).await {
            Ok(delivery) if delivery.is_applied() => {
                delivery.reports.iter().map(BankReport::to_string).collect()
            }
            Ok(_) => vec![not_found(account)],
            Err(err) => vec![err.to_string()],
        }
    }
}

fn not_found(account: &RoutingKey) -> String {
    format!("Account {account} not found")
}

/// Run a teller session until `exit` or end of input.
///
/// # Errors
///
/// Returns the first I/O error on either side.
pub async fn serve<R, W>(teller: &Teller, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match teller.execute(&line).await {
            Outcome::Exit => break,
            Outcome::Continue(out) => {
                for text in out {
                    output.write_all(text.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                }
                output.flush().await?;
            }
        }
    }
    Ok(())
}
