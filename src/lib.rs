//! OpenStack diagnostic collection.
//!
//! Given identifiers for a server, stack, user or related resources, this
//! crate gathers a structured bundle of state from the OpenStack CLI and,
//! when the control plane runs on Kubernetes, from `kubectl`.
//!
//! # Features
//!
//! - **Collectors as data**: a fixed, ordered catalog of backend commands
//!   with applicability rules over the supplied identifiers
//! - **Resolve then fan out**: server volumes, ports, networks, security
//!   groups, images, flavors, stack resources and pods are discovered and
//!   described one by one
//! - **Failure isolation**: a failing or timed-out command is recorded and
//!   the run goes on
//! - **Deterministic layout**: artifact paths depend only on category,
//!   collector and resource id
//! - **Privacy controls**: optional redaction of addresses and tokens
//! - **Archival**: optional zip of the finished bundle
//!
//! # Example
//!
//! ```no_run
//! use osdebug::{
//!     config::Settings,
//!     identifiers::{IdentifierSet, Mode},
//!     orchestrator::{Orchestrator, RunOptions},
//!     runner::SystemRunner,
//! };
//!
//! # async fn example() -> osdebug::Result<()> {
//! let settings = Settings::default();
//! let runner = SystemRunner::new(settings.backends.clone());
//! let ids = IdentifierSet {
//!     vm: Some("3f1c9a4e-8a0b-4f0e-9d55-1b2f6f0c7a10".to_string()),
//!     ..Default::default()
//! };
//!
//! let report = Orchestrator::new(runner, settings)
//!     .run(RunOptions {
//!         mode: Mode::Restricted,
//!         ids,
//!         output_dir: ".".into(),
//!         archive: false,
//!     })
//!     .await?;
//! println!("{}", report.summary_path.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod artifact;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod engine;
pub mod error;
pub mod identifiers;
pub mod orchestrator;
pub mod preflight;
pub mod privacy;
pub mod report;
pub mod runner;

pub use config::Settings;
pub use error::{Error, Result};
pub use identifiers::{IdentifierSet, Mode};
pub use orchestrator::{Orchestrator, RunOptions, RunReport};
pub use report::{RunResult, RunStatus};
