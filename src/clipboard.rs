use anyhow::{Result, anyhow};

#[cfg(not(target_os = "linux"))]
use copypasta::{ClipboardContext, ClipboardProvider};

/// External program that accepts clipboard contents on stdin.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PipeTool {
    program: &'static str,
    args: &'static [&'static str],
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const WL_COPY: PipeTool = PipeTool {
    program: "wl-copy",
    args: &[],
};

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const XCLIP: PipeTool = PipeTool {
    program: "xclip",
    args: &["-selection", "clipboard"],
};

/// Tools worth trying for the current display session, Wayland first.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn pipe_tools(wayland: bool, x11: bool) -> Vec<PipeTool> {
    let mut tools = Vec::new();
    if wayland {
        tools.push(WL_COPY);
    }
    // XWayland sessions set both variables
    if x11 {
        tools.push(XCLIP);
    }
    tools
}

#[cfg(target_os = "linux")]
pub fn copy_to_clipboard(value: &str) -> Result<()> {
    let tools = pipe_tools(
        std::env::var_os("WAYLAND_DISPLAY").is_some(),
        std::env::var_os("DISPLAY").is_some(),
    );

    if tools.is_empty() {
        return Err(anyhow!(
            "no graphical session found (DISPLAY and WAYLAND_DISPLAY unset); \
             pipe the code instead: auth-manager code <name> | xclip -selection clipboard"
        ));
    }

    let mut failures = Vec::new();
    for tool in &tools {
        match pipe_into(tool, value) {
            Ok(()) => {
                tracing::debug!(tool = tool.program, "code copied");
                return Ok(());
            }
            Err(e) => failures.push(e.to_string()),
        }
    }

    Err(anyhow!(
        "could not copy to clipboard ({}); install wl-clipboard or xclip",
        failures.join("; ")
    ))
}

#[cfg(target_os = "linux")]
fn pipe_into(tool: &PipeTool, value: &str) -> Result<()> {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new(tool.program)
        .args(tool.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow!("{}: {e}", tool.program))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(value.as_bytes())?;
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(anyhow!("{} exited with {status}", tool.program));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn copy_to_clipboard(value: &str) -> Result<()> {
    let mut ctx = ClipboardContext::new().map_err(|e| anyhow!("clipboard unavailable: {e}"))?;
    ctx.set_contents(value.to_string())
        .map_err(|e| anyhow!("could not copy to clipboard: {e}"))?;
    tracing::debug!("code copied");
    Ok(())
}
