//! # wh-engine
//!
//! Order execution and reconciliation engine.
//!
//! - **Parsing** (`parser`, `alert`): one line of alert text to a validated [`alert::Alert`]
//! - **Sizing** (`convert`): quote/base/percent/contract amounts to contract counts
//! - **Capabilities** (`capability`): leverage, margin and position mode kept in sync before orders
//! - **Reconciliation** (`reconcile`): absolute targets and closes to concrete orders
//! - **Queue** (`queue`): one in-flight order per symbol, polling and the insufficient-funds ladder
//! - **Latch** (`latch`): alerts deferred while their symbol is busy or the exchange is unreachable
//! - **Accounts** (`account`, `actor`, `store`): per-account state owned by a single task
//!
//! Every account is driven by exactly one tokio task; the listener talks to
//! it through an [`actor::AccountHandle`].

pub mod account;
pub mod actor;
pub mod alert;
pub mod bounded;
pub mod capability;
pub mod convert;
pub mod error;
pub mod latch;
pub mod order;
pub mod parser;
pub mod queue;
pub mod reconcile;
pub mod store;

pub use account::{Account, AlertOutcome};
pub use actor::AccountHandle;
pub use store::AccountStore;
