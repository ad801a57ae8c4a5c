//! Signals to whole process groups
//!
//! Children are spawned as leaders of their own group, so the group id equals
//! the child's pid and signalling the group reaches everything the shell
//! started.

#[cfg(unix)]
mod imp {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use tracing::debug;

    fn send(pid: u32, signal: Signal) -> bool {
        match killpg(Pid::from_raw(pid as i32), signal) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(e) => {
                debug!("killpg({}, {:?}) failed: {}", pid, signal, e);
                // Fall back to the leader alone
                kill(Pid::from_raw(pid as i32), signal).is_ok()
            }
        }
    }

    pub fn terminate_group(pid: u32) -> bool {
        send(pid, Signal::SIGTERM)
    }

    pub fn kill_group(pid: u32) -> bool {
        send(pid, Signal::SIGKILL)
    }

    pub fn is_alive(pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

#[cfg(not(unix))]
mod imp {
    // Without process groups the direct child is killed through its handle
    pub fn terminate_group(_pid: u32) -> bool {
        false
    }

    pub fn kill_group(_pid: u32) -> bool {
        false
    }

    pub fn is_alive(_pid: u32) -> bool {
        false
    }
}

/// Ask the group led by `pid` to shut down. False if nothing received it.
pub fn terminate_group(pid: u32) -> bool {
    imp::terminate_group(pid)
}

/// Kill the group led by `pid`
pub fn kill_group(pid: u32) -> bool {
    imp::kill_group(pid)
}

pub fn is_alive(pid: u32) -> bool {
    imp::is_alive(pid)
}
