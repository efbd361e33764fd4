//! # neo-otp
//!
//! Host-side session layer for OTP generators stored on NEOWAVE hardware
//! tokens. The token keeps the secrets and computes the codes; this crate
//! finds the token, keeps one validated connection to it and speaks the OTP
//! vendor extension of CTAP2 over USB HID or PC/SC.
//!
//! ## Architecture
//!
//! - **Transport**: enumerators and channels for USB HID and PC/SC
//! - **Session**: one probed connection, reused while it answers
//! - **Executor**: one lock and one timeout around every command
//! - **Codec / Directory**: OTP payloads and paginated listing
//! - **Backend**: the consumer API
//! - **Worker**: presence polling, periodic refresh and their coordination
//!
//! ## Example
//!
//! ```no_run
//! # fn main() -> Result<(), neo_otp::Error> {
//! use neo_otp::{BackendConfig, OtpBackend};
//!
//! let backend = OtpBackend::new(BackendConfig::default());
//! if backend.probe_presence() {
//!     for generator in backend.list_generators()? {
//!         println!("{}", generator.describe());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod executor;
pub mod secret;
pub mod session;
pub mod transport;
pub mod types;
pub mod worker;

// Re-export main types at root level for convenience
pub use backend::OtpBackend;
pub use config::{BackendConfig, BackendConfigBuilder, TransportKind};
pub use directory::GeneratorDirectory;
pub use error::{Error, Result};
pub use executor::CommandExecutor;
pub use session::{Session, SessionManager};
pub use transport::{CtapChannel, Endpoint, Enumerator};
pub use types::{Algorithm, Generator, GeneratorEntry, NewGenerator, OtpType};
pub use worker::{DirectoryRefresher, PresenceTracker, TokenEvent, TokenService, WorkerHandle};

pub use neo_otp_ctap::{OtpCommand, OtpStatus};
