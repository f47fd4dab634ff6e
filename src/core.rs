/// Error type returned by message consumers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A worker which owns its state and runs as a detached tokio task.
pub(crate) trait Spawn {
	fn spawn(self);
}
