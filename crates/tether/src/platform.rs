use std::sync::Arc;
use tether_core::ProcessLauncher;

/// Create the process launcher for the current platform.
pub fn create_launcher() -> Arc<dyn ProcessLauncher> {
    #[cfg(unix)]
    {
        Arc::new(tether_unix::UnixLauncherFactory::create_launcher())
    }
    #[cfg(windows)]
    {
        Arc::new(tether_windows::WindowsLauncherFactory::create_launcher())
    }
    #[cfg(all(not(unix), not(windows)))]
    {
        unimplemented!("no process launcher for this platform")
    }
}

pub fn platform_name() -> &'static str {
    #[cfg(unix)]
    {
        tether_unix::UnixLauncherFactory::platform_name()
    }
    #[cfg(windows)]
    {
        tether_windows::WindowsLauncherFactory::platform_name()
    }
    #[cfg(all(not(unix), not(windows)))]
    {
        "Unsupported"
    }
}
