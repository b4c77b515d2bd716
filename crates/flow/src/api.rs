use crate::{registry::Registry, utils::Utils};

use std::{ops::Deref, sync::Arc};

/// A finished [`Registry`] together with its [`Utils`], see [`api_builder`].
#[derive(Debug, Clone)]
pub struct Api {
	registry: Arc<Registry>,
	utils: Utils,
}

impl Api {
	#[must_use]
	pub const fn utils(&self) -> &Utils {
		&self.utils
	}

	#[must_use]
	pub fn registry(&self) -> &Registry {
		&self.registry
	}
}

impl Deref for Api {
	type Target = Registry;

	fn deref(&self) -> &Self::Target {
		&self.registry
	}
}

/// Wraps `registry` with a [`Utils`] over the very same registry, without touching its contents.
#[must_use]
pub fn api_builder(registry: Registry) -> Api {
	let registry = Arc::new(registry);

	Api {
		utils: Utils::new(Arc::clone(&registry)),
		registry,
	}
}
