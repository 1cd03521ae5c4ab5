//! # Riptide Protocol Crate
//!
//! This crate contains the core Scrypto blueprint for the Riptide protocol, a lending engine
//! that disburses a stable asset against vote-escrowed position NFTs pledged as collateral.
//!
//! Pledged positions keep working for their owners: the engine votes with them every epoch
//! and settles their voting rewards against the outstanding loan balance, so a loan can pay
//! itself off out of the position's own yield.
//!
//! ## Modules
//!
//! The crate is organized into the following modules:
//!
//! - `riptide_component`: Defines the main `Riptide` component, which manages the loan
//!   ledger, position custody, the max-loan calculation, epoch-aligned rewards settlement,
//!   default-pool voting, and the protocol parameters. This is the heart of the protocol's logic.
//! - `events`: Defines the various events emitted by the engine, allowing off-ledger services
//!   to track state changes.
//! - `shared_structs`: Contains the persisted data structures (`Loan`, `LoanReceipt`,
//!   `ZeroBalanceOption`) and the `LoanInfoReturn` view struct, kept separable from the
//!   component logic.

pub mod riptide_component;
pub mod events;
pub mod shared_structs;
