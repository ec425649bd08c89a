//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage, account, delivery) provides a `Registry`
/// struct per implementation that declares its configuration name and factory.
pub trait ImplementationRegistry {
	/// Name used in configuration to select this implementation, for example
	/// `"file"` for `storage.implementations.file`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	fn factory() -> Self::Factory;
}
