use futures_util::future::BoxFuture;
use std::fmt::Display;
use tracing::warn;

/// Run `operation` against `ctx` up to `max_attempts` times.
///
/// Between two attempts `recovery` gets a chance to repair the context (reload a
/// page, reconnect, ...). Recovery never runs after the final attempt. If recovery
/// itself fails, its error is returned and no further attempts are made.
///
/// ```rust,ignore
/// let page = retry(session, 2, |s| parse(s.html()), |s| Box::pin(s.reload())).await?;
/// ```
pub async fn retry<C, T, E, Op, Rec>(
    ctx: &mut C,
    max_attempts: u32,
    mut operation: Op,
    mut recovery: Rec,
) -> Result<T, E>
where
    C: ?Sized,
    E: Display,
    Op: FnMut(&mut C) -> Result<T, E>,
    Rec: for<'a> FnMut(&'a mut C) -> BoxFuture<'a, Result<(), E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(&mut *ctx) {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Attempt {}/{} failed: {}; recovering before retry",
                    attempt, max_attempts, e
                );
                recovery(&mut *ctx).await?;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
