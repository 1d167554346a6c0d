use anyhow::Result;

/// Issues opaque correlation ids for new waiters.
///
/// Generators are not required to guarantee uniqueness; the manager checks
/// every candidate against the live registry and asks again on a
/// collision. Any `Fn() -> anyhow::Result<String>` closure is a generator,
/// which lets tests force collisions deterministically.
pub trait IdGen: Send + Sync {
    fn gen_id(&self) -> Result<String>;
}

impl<F> IdGen for F
where
    F: Fn() -> Result<String> + Send + Sync,
{
    fn gen_id(&self) -> Result<String> {
        (self)()
    }
}

/// The default generator: a random 128-bit id in UUID form.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGen;

impl IdGen for UuidGen {
    fn gen_id(&self) -> Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
}
