pub mod authority;
pub mod binding;
pub mod codec;
pub mod config;
pub mod interpolation;
pub mod protocol;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod stats;

pub use authority::AuthoritySide;
pub use binding::{Binding, BindingError, BindingRegistry, ROOT_COMPONENT, TargetId};
pub use codec::WireError;
pub use config::SyncConfig;
pub use interpolation::{InsertOutcome, InterpolationBuffer, Pose};
pub use protocol::{AnimationState, FieldMask, MAX_MESSAGE_SIZE, Snapshot};
pub use sender::TransformSender;
pub use session::{SyncSession, Transport, TransformSource};
pub use simulator::{LinkConditions, LinkSimulator};
pub use stats::SyncStats;
