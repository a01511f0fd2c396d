use anyhow::{Result, anyhow};

#[cfg(target_os = "linux")]
use std::process::{Command, Stdio};

#[cfg(not(target_os = "linux"))]
use copypasta::{ClipboardContext, ClipboardProvider};

/// Linux: wl-copy on Wayland, xclip on X11.
#[cfg(target_os = "linux")]
pub fn copy_to_clipboard(value: &str) -> Result<()> {
    let has_wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
    let has_x11 = std::env::var_os("DISPLAY").is_some();

    if !has_wayland && !has_x11 {
        return Err(anyhow!(
            "No GUI clipboard detected (no DISPLAY or WAYLAND_DISPLAY). \
             Print the passcode instead:\n  xauth ls"
        ));
    }

    if has_wayland && try_pipe_to("wl-copy", &[], value).is_ok() {
        return Ok(());
    }

    if has_x11 && try_pipe_to("xclip", &["-selection", "clipboard"], value).is_ok() {
        return Ok(());
    }

    Err(anyhow!(
        "Failed to copy to clipboard: wl-copy/xclip not available or failed.\n\
         Try installing `wl-clipboard` or `xclip`."
    ))
}

#[cfg(target_os = "linux")]
fn try_pipe_to(cmd: &str, args: &[&str], value: &str) -> Result<()> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow!("failed to spawn {cmd}: {e}"))?;

    {
        use std::io::Write;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(value.as_bytes())?;
        }
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(anyhow!("{cmd} exited with status {status}"));
    }
    tracing::debug!(tool = cmd, "copied to clipboard");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn copy_to_clipboard(value: &str) -> Result<()> {
    let mut ctx =
        ClipboardContext::new().map_err(|e| anyhow!("Failed to initialize clipboard: {e}"))?;

    ctx.set_contents(value.to_string())
        .map_err(|e| anyhow!("Failed to copy to clipboard: {e}"))?;

    Ok(())
}
