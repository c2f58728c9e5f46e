//! Environment source: GROUPEXEC_POOL_SIZE, GROUPEXEC_LOGGING__LEVEL, ...

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("GROUPEXEC")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    )
}
