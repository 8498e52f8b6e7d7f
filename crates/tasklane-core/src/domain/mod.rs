//! Domain model (task names, loop states, errors, events, ids).

pub mod errors;
pub mod events;
pub mod ids;
pub mod state;
pub mod task_name;

pub use self::errors::{ErrorKind, WorkerError};
pub use self::events::{EventKind, WorkerEvent};
pub use self::ids::WorkerId;
pub use self::state::LoopState;
pub use self::task_name::{Field, TaskName, TaskNameError};
