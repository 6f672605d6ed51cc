use std::io;
use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

use super::{ProcessOutput, SandboxCommand};

/// Spawns `cmd` in its own process group and drives it to completion
///
/// Stdin is fed and both output streams are drained concurrently so a chatty
/// program cannot deadlock on a full pipe. Each stream keeps at most
/// `output_limit` bytes. On timeout the whole process group is killed.
pub(super) async fn drive(
    mut cmd: Command,
    request: &SandboxCommand,
    output_limit: usize,
) -> io::Result<ProcessOutput> {
    cmd.current_dir(&request.work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start_time = Instant::now();
    let mut child = cmd.spawn()?;
    let pid = child.id();

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let input = request.stdin.as_bytes().to_vec();

    let feed = async move {
        if let Some(mut stdin) = stdin {
            // The program may exit without reading everything; a broken pipe is expected
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        }
    };

    let collect = async {
        let ((), out, err, status) = tokio::join!(
            feed,
            read_capped(stdout, output_limit),
            read_capped(stderr, output_limit),
            child.wait()
        );
        (out, err, status)
    };

    let outcome = timeout(request.timeout, collect).await;
    let elapsed = start_time.elapsed();

    // Either way, nothing from this run may outlive the call
    kill_process_group(pid);

    match outcome {
        Ok((out, err, status)) => {
            let status = status?;
            let (stdout, stdout_truncated) = out?;
            let (stderr, stderr_truncated) = err?;

            Ok(ProcessOutput {
                status: Some(status),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                timed_out: false,
                stdout_truncated,
                stderr_truncated,
                elapsed,
            })
        }
        Err(_) => {
            log::debug!(
                "Process {pid:?} exceeded {:?}, killed after {elapsed:?}",
                request.timeout
            );
            if let Err(e) = child.start_kill() {
                log::debug!("Process {pid:?} already gone: {e}");
            }
            if let Err(e) = child.wait().await {
                log::error!("Failed to reap timed out process {pid:?}: {e}");
            }

            Ok(ProcessOutput {
                status: None,
                timed_out: true,
                elapsed,
                ..Default::default()
            })
        }
    }
}

/// Reads up to `limit` bytes and discards the rest of the stream
async fn read_capped<R>(reader: Option<R>, limit: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut buf = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;

    Ok((buf, discarded > 0))
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; ESRCH for an empty group is harmless
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
