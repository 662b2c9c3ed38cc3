/// Application settings loaded from lantern.toml
pub mod settings;

pub use settings::{BotSettings, DiSettings, Settings, load_app_settings, load_settings};

use std::{env, sync::OnceLock};

/// Environment variable that disables dependency injection when set to `true`.
pub const DI_DISABLED_ENV: &str = "LANTERN_DI_DISABLED";

static DI_ENABLED: OnceLock<bool> = OnceLock::new();

/// Whether an environment value for [`DI_DISABLED_ENV`] turns dependency injection off.
#[must_use]
pub fn disabled_by_env_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

pub(crate) fn di_disabled_by_env() -> bool {
    disabled_by_env_value(env::var(DI_DISABLED_ENV).ok().as_deref())
}

/// Process-wide dependency injection switch.
///
/// Fixed on first read. Unless [`set_di_enabled`] ran earlier, it is taken from
/// [`DI_DISABLED_ENV`].
pub fn di_enabled() -> bool {
    *DI_ENABLED.get_or_init(|| !di_disabled_by_env())
}

/// Fixes the process-wide switch. Returns `false` if it had already been read or set.
pub fn set_di_enabled(enabled: bool) -> bool {
    DI_ENABLED.set(enabled).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_true_disables() {
        assert!(disabled_by_env_value(Some("true")));
        assert!(disabled_by_env_value(Some(" TRUE ")));
        assert!(!disabled_by_env_value(Some("1")));
        assert!(!disabled_by_env_value(Some("false")));
        assert!(!disabled_by_env_value(None));
    }
}
