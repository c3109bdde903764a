mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
#[cfg(feature = "backend-tract")]
pub use backends::{class_names_for, TractBackend};
pub use backends::{ScriptedBackend, ScriptedPass};
pub use registry::BackendRegistry;
pub use result::{LabelScore, RawDetection};
