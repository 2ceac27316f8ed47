//! Self-update for hothost applications.
//!
//! A running instance can receive a newer build of itself over HTTP and swap it in place,
//! and a newer build can push itself to a running instance.
//!
//! # Components
//!
//! - [`version`]: identity lines (`name\tversion`) and the version comparator
//! - [`access`]: CIDR allow-list in front of the sensitive endpoints
//! - [`receiver`]: shared-secret check and staging of the uploaded build
//! - [`plan`] / [`script`] / [`applier`]: the hand-off script that replaces the
//!   executable after this process steps aside
//! - [`orchestrator`]: the pushing side (`hothost autoupdate`)
//!
//! # Update Flow
//!
//! ```text
//! new build                              running instance
//! ─────────                              ────────────────
//! GET /version ───────────────────────▶  "MyApp\t1.0.0"
//! PUT /autoupdate (UpdateSecret) ─────▶  allow-list + secret check
//!                                        stage upload beside the executable
//!                 ◀───────────────────── 200 "update received"
//!                                        write + launch hand-off script, exit
//!                                        script: archive old, move new, restart
//! GET /version (polled) ──────────────▶  "MyApp\t1.1.0"
//! ```
//!
//! # Deployment Modes
//!
//! | Mode | Stop | Restart | Script |
//! |---|---|---|---|
//! | Windows service | `sc stop` | `sc start` | `.bat` |
//! | Windows command line | process exit | relaunch | `.bat` |
//! | Linux systemd service | unit restart | `systemctl restart` | bash |
//! | Linux command line | process exit | relaunch | sh |
//!
//! The previous executable is kept as `<name>-<yyyy-MM-dd-HHmmss>` next to the new one.
//! Neither archived executables nor the staging files of failed uploads are cleaned up.

pub mod access;
pub mod applier;
pub mod orchestrator;
pub mod plan;
pub mod receiver;
pub mod script;
pub mod version;

pub use access::{AccessGuard, is_authorized};
pub use applier::{Handoff, PlatformUpdateApplier, detect_mode};
pub use orchestrator::{
    Fetch, HttpTransport, Sleeper, TokioSleeper, UpdateOrchestrator, UpdateReport, UpdateTransport,
};
pub use plan::{BatchStep, DeploymentMode, PlanSteps, PosixStep, ScriptPlan};
pub use receiver::{ReceiveOutcome, TempExecutable, UpdatePayloadReceiver, UpdateRequestContext};
pub use version::{VersionIdentity, compare_versions, version_document};
