//! Passkey prompt with scoped terminal echo control.
//!
//! The terminal is switched to "echo off, echo newline on" only for the
//! duration of the read.  `EchoGuard` owns the captured attributes and puts
//! them back when it goes out of scope, whatever path the read takes.

use std::io::{self, BufRead, Write};

use zeroize::Zeroizing;

use crate::cli::output;

/// Text written before reading the passkey.
pub const PROMPT: &str = "Enter Password: ";

/// Master passkey, wiped from memory on drop.
pub type Passkey = Zeroizing<String>;

/// Terminal echo switching.
///
/// `echo_off` returns the attributes it replaced; the same value is handed
/// back to `restore`.
pub trait EchoControl {
    type Saved;

    fn echo_off(&mut self) -> io::Result<Self::Saved>;

    fn restore(&mut self, saved: &Self::Saved) -> io::Result<()>;
}

/// Restores captured terminal attributes on drop.
pub struct EchoGuard<'a, E: EchoControl> {
    control: &'a mut E,
    saved: Option<E::Saved>,
}

impl<'a, E: EchoControl> EchoGuard<'a, E> {
    /// Turn echo off.  Failure is a warning: the read still happens, and
    /// there is nothing to restore.
    pub fn engage(control: &'a mut E) -> Self {
        let saved = match control.echo_off() {
            Ok(saved) => Some(saved),
            Err(e) => {
                output::warning(&format!("Couldn't turn off echo: {e}"));
                None
            }
        };
        Self { control, saved }
    }
}

impl<E: EchoControl> Drop for EchoGuard<'_, E> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            if let Err(e) = self.control.restore(&saved) {
                output::warning(&format!("Couldn't restore echo: {e}"));
            }
        }
    }
}

/// Write the prompt to `out`, then read one line from `input` with echo
/// disabled.  The line terminator is not part of the passkey.
pub fn acquire_passkey<R, W, E>(out: &mut W, input: &mut R, echo: &mut E) -> io::Result<Passkey>
where
    R: BufRead,
    W: Write,
    E: EchoControl,
{
    out.write_all(PROMPT.as_bytes())?;
    out.flush()?;

    let _guard = EchoGuard::engage(echo);

    let mut line = Zeroizing::new(String::with_capacity(256));
    input.read_line(&mut line)?;

    let len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(len);
    Ok(line)
}

/// Prompt on the controlling terminal (stdout / stdin).
pub fn prompt_passkey() -> io::Result<Passkey> {
    let stdout = io::stdout();
    let stdin = io::stdin();
    let mut echo = TtyEcho::new();
    acquire_passkey(&mut stdout.lock(), &mut stdin.lock(), &mut echo)
}

/// Echo control for the process's stdin terminal.
#[cfg(unix)]
pub struct TtyEcho {
    stdin: io::Stdin,
}

#[cfg(unix)]
impl TtyEcho {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

#[cfg(unix)]
impl Default for TtyEcho {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl EchoControl for TtyEcho {
    type Saved = nix::sys::termios::Termios;

    fn echo_off(&mut self) -> io::Result<Self::Saved> {
        use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};

        let saved = tcgetattr(&self.stdin)?;
        let mut quiet = saved.clone();
        quiet.local_flags.remove(LocalFlags::ECHO);
        quiet.local_flags.insert(LocalFlags::ECHONL);
        tcsetattr(&self.stdin, SetArg::TCSANOW, &quiet)?;
        Ok(saved)
    }

    fn restore(&mut self, saved: &Self::Saved) -> io::Result<()> {
        use nix::sys::termios::{tcsetattr, SetArg};

        tcsetattr(&self.stdin, SetArg::TCSANOW, saved)?;
        Ok(())
    }
}

/// Echo control stand-in where termios is unavailable.
#[cfg(not(unix))]
#[derive(Default)]
pub struct TtyEcho;

#[cfg(not(unix))]
impl TtyEcho {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl EchoControl for TtyEcho {
    type Saved = ();

    fn echo_off(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "terminal echo control is not supported on this platform",
        ))
    }

    fn restore(&mut self, _saved: &()) -> io::Result<()> {
        Ok(())
    }
}
