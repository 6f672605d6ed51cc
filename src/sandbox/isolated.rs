use async_trait::async_trait;
use tokio::process::Command;

use super::{ProcessOutput, Sandbox, SandboxCommand, process};
use crate::config::{ByteSize, ResourceLimits};

const SANDBOX_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// A sandbox that confines each program with OS resource limits
///
/// Every process starts with an empty environment (only `PATH` and `LANG`),
/// in its own process group, with `setrlimit` caps on address space, CPU time,
/// written file size, open files and process count. Core dumps are disabled.
/// With `deny_network` the child is moved into fresh user and network
/// namespaces before exec, so it has no usable network interfaces; if the host
/// forbids unprivileged namespaces the launch fails instead of running
/// unconfined.
#[derive(Debug, Clone)]
pub struct IsolatedSandbox {
    output_limit: usize,
    deny_network: bool,
}

impl IsolatedSandbox {
    pub fn new(output_limit: ByteSize, deny_network: bool) -> Self {
        Self {
            output_limit: usize::try_from(output_limit.0).unwrap_or(usize::MAX),
            deny_network,
        }
    }
}

#[async_trait]
impl Sandbox for IsolatedSandbox {
    fn name(&self) -> &'static str {
        "isolated"
    }

    async fn execute(&self, command: SandboxCommand) -> std::io::Result<ProcessOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .env_clear()
            .env("PATH", SANDBOX_PATH)
            .env("LANG", "C.UTF-8");

        #[cfg(unix)]
        {
            let limits = command.limits.clone();
            let deny_network = self.deny_network;
            // SAFETY: the closure only performs async-signal-safe syscalls
            unsafe {
                cmd.pre_exec(move || {
                    if deny_network {
                        enter_network_namespace()?;
                    }
                    apply_rlimits(&limits)
                });
            }
        }

        process::drive(cmd, &command, self.output_limit).await
    }
}

#[cfg(unix)]
fn apply_rlimits(limits: &ResourceLimits) -> std::io::Result<()> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    if let Some(memory) = limits.memory {
        set_limit(libc::RLIMIT_AS, memory.0)?;
    }
    if let Some(cpu_time) = limits.cpu_time {
        // Hard limit one second above soft so the program sees SIGXCPU, not SIGKILL
        set_limit_pair(libc::RLIMIT_CPU, cpu_time.0, cpu_time.0.saturating_add(1))?;
    }
    if let Some(file_size) = limits.file_size {
        set_limit(libc::RLIMIT_FSIZE, file_size.0)?;
    }
    if let Some(open_files) = limits.open_files {
        set_limit(libc::RLIMIT_NOFILE, open_files)?;
    }
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    if let Some(processes) = limits.processes {
        set_limit(libc::RLIMIT_NPROC, processes)?;
    }
    set_limit(libc::RLIMIT_CORE, 0)
}

#[cfg(all(unix, not(target_os = "linux")))]
type Resource = libc::c_int;
#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(all(target_os = "linux", not(target_env = "gnu")))]
type Resource = libc::c_int;

#[cfg(unix)]
fn set_limit(resource: Resource, value: u64) -> std::io::Result<()> {
    set_limit_pair(resource, value, value)
}

#[cfg(unix)]
fn set_limit_pair(resource: Resource, soft: u64, hard: u64) -> std::io::Result<()> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit writes into a struct owned by this frame
    if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // An unprivileged process may lower but never raise its hard limit
    let ceiling = current.rlim_max;
    let clamp = |value: u64| {
        let value = value as libc::rlim_t;
        if ceiling == libc::RLIM_INFINITY {
            value
        } else {
            value.min(ceiling)
        }
    };
    let limit = libc::rlimit {
        rlim_cur: clamp(soft),
        rlim_max: clamp(hard),
    };
    // SAFETY: setrlimit reads a fully initialized struct owned by this frame
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn enter_network_namespace() -> std::io::Result<()> {
    // SAFETY: unshare only changes namespaces of the calling (child) process
    if unsafe { libc::unshare(libc::CLONE_NEWUSER | libc::CLONE_NEWNET) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn enter_network_namespace() -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "network isolation requires Linux namespaces",
    ))
}
