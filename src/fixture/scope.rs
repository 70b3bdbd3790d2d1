use super::{FixtureContext, FixtureDatabase};
use crate::config::{DatabaseConfiguration, DatabaseDefinition};
use crate::error::Result;

/// Provision a fixture, run `test_fn` against it and dispose it.
///
/// The closure runs even when deployment failed, so it can assert on
/// [`FixtureDatabase::deployment`]. A disposal error is returned in place of the
/// closure's value.
pub async fn with_fixture<F, R>(
    context: FixtureContext,
    definition: DatabaseDefinition,
    configuration: DatabaseConfiguration,
    test_fn: F,
) -> Result<R>
where
    F: std::ops::AsyncFnOnce(&FixtureDatabase) -> R,
{
    let fixture = FixtureDatabase::provision(context, definition, configuration).await?;

    let result = test_fn(&fixture).await;

    fixture.dispose().await?;
    Ok(result)
}
