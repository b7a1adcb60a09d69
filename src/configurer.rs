use crate::connection::EngineHandle;
use crate::core::Result;
use async_trait::async_trait;

/// Startup hook run against the engine before any transaction starts.
///
/// Hooks run once, in ascending `priority()` order (lower runs first);
/// hooks with equal priority run in registration order. Returning
/// `Some(handle)` replaces the engine for every later hook and for the
/// application.
#[async_trait]
pub trait DatabaseConfigurer: Send + Sync {
    fn priority(&self) -> i32 {
        0
    }

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn configure(&self, engine: &EngineHandle) -> Result<Option<EngineHandle>>;
}

/// Apply `configurers` to `engine` and return the resulting handle.
pub async fn apply_all(
    engine: EngineHandle,
    mut configurers: Vec<Box<dyn DatabaseConfigurer>>,
) -> Result<EngineHandle> {
    // sort_by_key is stable
    configurers.sort_by_key(|c| c.priority());

    let mut engine = engine;
    for configurer in &configurers {
        log::debug!(
            "Applying configurer {} (priority {})",
            configurer.name(),
            configurer.priority()
        );
        if let Some(replacement) = configurer.configure(&engine).await? {
            log::info!("Configurer {} replaced the engine", configurer.name());
            engine = replacement;
        }
    }

    Ok(engine)
}
