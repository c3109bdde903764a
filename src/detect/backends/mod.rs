pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::{ScriptedBackend, ScriptedPass};

#[cfg(feature = "backend-tract")]
pub use tract::{class_names_for, TractBackend};
