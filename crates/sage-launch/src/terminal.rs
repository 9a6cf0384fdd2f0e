//! AppleScript that runs Sage's command line in a terminal emulator.

use std::path::Path;

/// One-shot shell command: clear the screen, run sage, close the shell.
pub fn sage_shell_command(sage_executable: &Path) -> String {
    format!("clear ; {} ; exit", sage_executable.display())
}

/// Escape `text` for use inside an AppleScript string literal.
fn applescript_quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Script for Terminal.app.
///
/// If Terminal is not running, telling it to activate opens a window; the
/// command goes into that window instead of a second one.
pub fn terminal_app_script(command: &str) -> String {
    format!(
        r#"set command to "{}"
tell application "System Events"
    set terminalProcesses to application processes whose name is "Terminal"
end tell
if terminalProcesses is {{}} then
    set terminalIsRunning to false
else
    set terminalIsRunning to true
end if
if terminalIsRunning then
    tell application "Terminal"
        activate
        do script command
    end tell
else
    tell application "Terminal"
        activate
        do script command in window 1
    end tell
end if
"#,
        applescript_quote(command)
    )
}

/// Script for iTerm2: a new window with the default profile running the
/// command through bash.
pub fn iterm_script(command: &str) -> String {
    let shell = format!("/bin/bash -c '{}'", command.replace('\'', r"'\''"));
    format!(
        r#"set sageCommand to "{}"
tell application "iTerm"
    set sageWindow to (create window with default profile command sageCommand)
    select sageWindow
end tell
"#,
        applescript_quote(&shell)
    )
}
