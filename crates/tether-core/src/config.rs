use derive_builder::Builder;
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration for a [`MasterController`].
///
/// Constructed once per controller; the controller may be started any number
/// of times from the same configuration, each time producing a fresh child
/// process.
///
/// [`MasterController`]: crate::MasterController
#[derive(Default, Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct ControllerConfig {
    /// Human-readable name, used in logs to tell controllers apart.
    pub name: String,

    /// Executable that hosts the child.
    pub command: String,

    /// Extra arguments passed to the child before the locator/entry pair.
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,

    /// Environment variables set for the child process.
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,

    /// Identity of the entry point the child process must run. The child
    /// receives it verbatim as `--entry <child_entry>`.
    pub child_entry: String,

    /// Working directory for the child process.
    #[builder(default)]
    pub working_directory: Option<PathBuf>,

    /// Directory where the callback locator is published. A temporary
    /// directory is used when unset.
    #[builder(default)]
    pub locator_dir: Option<PathBuf>,
}

impl ControllerConfig {
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// Validate the configuration before the first `start`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.command.is_empty() {
            return Err(anyhow::anyhow!("command cannot be empty"));
        }

        if self.child_entry.is_empty() {
            return Err(anyhow::anyhow!("child_entry cannot be empty"));
        }

        Ok(())
    }
}

impl ControllerConfigBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());

        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}
