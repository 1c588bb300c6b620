mod unix_launcher;

pub use unix_launcher::{UnixProcessHandle, UnixProcessLauncher};

pub struct UnixLauncherFactory;

impl UnixLauncherFactory {
    pub fn create_launcher() -> UnixProcessLauncher {
        UnixProcessLauncher::new()
    }

    pub fn platform_name() -> &'static str {
        "Unix"
    }
}
