use core_types::BoxError;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Work to run when the process is asked to stop.
///
/// `before` hooks run first (e.g. closing the database), then `after` hooks.
/// Every hook runs even if an earlier one failed.
#[derive(Default)]
pub struct ShutdownHooks {
    before: Vec<(String, Hook)>,
    after: Vec<(String, Hook)>,
}

impl ShutdownHooks {
    pub fn before_shutdown<F, Fut, E>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.before.push((name.into(), boxed(hook)));
    }

    pub fn after_shutdown<F, Fut, E>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.after.push((name.into(), boxed(hook)));
    }

    pub fn len(&self) -> usize {
        self.before.len() + self.after.len()
    }

    /// Runs every hook in registration order and reports all failures together.
    pub async fn run(self) -> Result<(), ShutdownErrors> {
        let mut failures = Vec::new();

        for (name, hook) in self.before.into_iter().chain(self.after) {
            tracing::debug!(hook = %name, "running shutdown hook");
            if let Err(source) = hook().await {
                tracing::error!(hook = %name, error = %source, "shutdown hook failed");
                failures.push(HookFailure { hook: name, source });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownErrors(failures))
        }
    }
}

fn boxed<F, Fut, E>(hook: F) -> Hook
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move || hook().map(|r| r.map_err(Into::<BoxError>::into)).boxed())
}

/// A hook that returned an error.
#[derive(Debug, thiserror::Error)]
#[error("{hook}: {source}")]
pub struct HookFailure {
    pub hook: String,
    pub source: BoxError,
}

/// Every hook failure from one shutdown, joined with `; `.
#[derive(Debug, thiserror::Error)]
#[error("{}", join(.0))]
pub struct ShutdownErrors(pub Vec<HookFailure>);

fn join(failures: &[HookFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
