//! Banking demo built on the keyed command bus.
//!
//! Every account is an entity on the bus, keyed by its number. A transfer is
//! two commands: `StartTransfer` debits the sender and, when funds allow,
//! publishes `FinishTransfer` to credit the receiver.
//!
//! # Architecture
//!
//! ```text
//! teller line ─► Instruction ─► BankCommand ─► KeyedBus
//!                                                 │
//!                            ┌────────────────────┴───────────┐
//!                            ▼                                ▼
//!                   account "123456"                 account "999999"
//!                   StartTransfer: debit ──Publish──► FinishTransfer: credit
//! ```
//!
//! Both accounts of a transfer are locked together, so no reader sees the
//! amount debited but not yet credited. If the receiver cannot hold the
//! credit exactly, `FinishTransfer` publishes `RefundTransfer` back to the
//! sender before the locks are released.
//!
//! # Quick Start
//!
//! ```no_run
//! use banking::{AccountHandler, Config, Teller, open_bank};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let bus = open_bank(&config)?;
//! let teller = Teller::new(Arc::new(bus));
//!
//! teller.execute("transfer 123456 999999 30").await;
//! teller.execute("balance 999999").await; // Account 999999 balance is 430.00
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod config;
pub mod teller;
pub mod types;

// Re-export commonly used types
pub use account::AccountHandler;
pub use config::{Config, ConfigError};
pub use teller::{BankBus, Instruction, Outcome, ParseError, Teller, USAGE, serve};
pub use types::{Account, BankCommand, BankReport};

use demandbus_core::BusError;
use demandbus_runtime::{KeyedBus, Registry};
use std::sync::Arc;

/// Build a bus holding the configured seed accounts.
///
/// # Errors
///
/// Returns [`BusError::AlreadyExists`] if the seed repeats an account number.
pub fn open_bank(config: &Config) -> Result<KeyedBus<AccountHandler>, BusError> {
    let registry = Registry::seeded(
        config
            .seed_accounts
            .iter()
            .map(|(number, balance)| (number.clone(), Account::new(number.clone(), *balance))),
    )?;
    tracing::info!(accounts = config.seed_accounts.len(), "Bank opened");

    Ok(KeyedBus::with_registry(
        AccountHandler::new(),
        Arc::new(registry),
        config.bus,
    ))
}
