//! Process bootstrap: deriving `server_ident` and forking the first client
//! (forks and execs a login process, or a given command, as the first
//! client).
use crate::error::StartupError;
use std::ffi::CString;
use std::io;

/// The `DISPLAY`-style identifier this instance advertises to children,
/// `"compositor"` fullscreen, `"compositor-nest-<pid>"` nested.
pub fn server_ident(nested: bool) -> String {
    if nested {
        format!("compositor-nest-{}", std::process::id())
    } else {
        "compositor".to_string()
    }
}

/// Forks and execs `command` (defaulting to the user's login shell) as the
/// first client, with `DISPLAY` set to `ident` in its environment. Returns
/// the child's pid to the parent; never returns in the child.
pub fn spawn_first_client(command: &[String], ident: &str) -> Result<libc::pid_t, StartupError> {
    let (program, args): (String, &[String]) = match command {
        [] => (std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()), &[]),
        [prog, rest @ ..] => (prog.clone(), rest),
    };

    let argv0 = CString::new(program.as_str()).expect("command has no interior NUL");
    let mut argv_c: Vec<CString> = vec![argv0.clone()];
    for a in args {
        argv_c.push(CString::new(a.as_str()).expect("argument has no interior NUL"));
    }
    let mut argv_ptrs: Vec<*const libc::c_char> = argv_c.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    // SAFETY: standard fork/exec. The child only touches async-signal-safe
    // functions (setenv, execvp) before exec or _exit.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(StartupError::Spawn { command: program, source: io::Error::last_os_error() });
    }
    if pid == 0 {
        let key = CString::new("DISPLAY").unwrap();
        let val = CString::new(ident).expect("server_ident has no interior NUL");
        unsafe {
            libc::setenv(key.as_ptr(), val.as_ptr(), 1);
            libc::execvp(argv0.as_ptr(), argv_ptrs.as_ptr());
            // execvp only returns on failure.
            libc::_exit(127);
        }
    }
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_distinguishes_nested_from_fullscreen() {
        assert_eq!(server_ident(false), "compositor");
        assert!(server_ident(true).starts_with("compositor-nest-"));
    }
}
