pub mod reconciler;
pub mod session;
pub mod source_traits;
