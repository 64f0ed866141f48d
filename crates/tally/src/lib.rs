//! tally - natural-language chat front end for a Bitcoin ledger canister
//!
//! Inbound chat text is resolved into ledger operations by a language model,
//! the operations run against the canister's HTTP gateway, and the results
//! come back as one reply per text item.
//!
//! ```text
//! Envelope ─▶ SessionHandler ─ ack ─▶ Outbox
//!                 │
//!                 ▼ text
//!            Orchestrator ─▶ IntentResolver (OpenAI tools)
//!                 │
//!                 ▼ calls (probe first, then fan out)
//!            LedgerClient ─▶ /get-balance, /get-utxos, /send, …
//! ```

pub mod catalog;
pub mod dispatch;
pub mod ledger;
pub mod request;
pub mod resolver;
pub mod session;
pub mod stdio;
pub mod types;

pub use catalog::{Catalog, OperationSpec, ParamSpec, ParamType};
pub use dispatch::{DispatchReport, Entry, Orchestrator, NO_INTENT_REPLY, UNREACHABLE_REPLY};
pub use ledger::{LedgerClient, LedgerError};
pub use request::{ArgumentError, LedgerRequest};
pub use resolver::{IntentResolver, OpenAiResolver, ResolveError};
pub use session::{ChannelOutbox, Outbox, SessionHandler, TurnReport, TurnState};
pub use types::{OperationCall, OperationResult};
