//! Two-process aggregate statistics and sorting over a split float dataset.
//!
//! A coordinator and a peer each hold one half of the dataset. The
//! coordinator drives the peer over a single framed TCP link and combines
//! both halves' sums, maxima and sorted runs.

pub mod config;
pub mod dataset;
pub mod engine;
pub mod net;
pub mod report;
pub mod session;
pub mod transform;

pub use config::Config;
pub use engine::{Engine, Mode, Op};
pub use net::error::Error;
pub use net::link::Link;
pub use net::wire::Command;
pub use report::Report;
pub use session::{coordinator::Coordinator, peer::Peer};
pub use transform::transform;
