#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Extension trait for spawning launcher child processes, providing unified
/// support for console suppression and process detachment.
pub trait LanternCommandExt {
    /// Hides the console window on Windows. No-op on other platforms.
    fn suppress_console(&mut self) -> &mut Self;

    /// Detaches the process from its parent so the game survives the launcher.
    /// On Windows this uses CREATE_NEW_PROCESS_GROUP, on Unix a new session via setsid.
    fn detach(&mut self) -> &mut Self;
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;

impl LanternCommandExt for std::process::Command {
    fn suppress_console(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }

    fn detach(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                self.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }
        self
    }
}

impl LanternCommandExt for tokio::process::Command {
    fn suppress_console(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }

    fn detach(&mut self) -> &mut Self {
        // stdout/stderr stay pipeable, so no DETACHED_PROCESS here
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }
        #[cfg(unix)]
        {
            unsafe {
                self.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }
        self
    }
}
