mod windows_launcher;

pub use windows_launcher::{WindowsProcessHandle, WindowsProcessLauncher};

pub struct WindowsLauncherFactory;

impl WindowsLauncherFactory {
    pub fn create_launcher() -> WindowsProcessLauncher {
        WindowsProcessLauncher::new()
    }

    pub fn platform_name() -> &'static str {
        "Windows"
    }
}
