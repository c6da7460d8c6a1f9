//! Command-line surface for the `compositor` binary.
use clap::Parser;

/// A software compositor: a window registry, damage-driven render loop, and
/// input dispatcher reachable over a local socket transport.
#[derive(Debug, Parser)]
#[command(name = "compositor", version, about)]
pub struct Cli {
    /// Virtual screen size, `WIDTHxHEIGHT`.
    #[arg(short = 'g', long, default_value = "1024x768", value_parser = parse_geometry)]
    pub geometry: Geometry,

    /// Run nested inside another compositor instance rather than fullscreen.
    /// Disables cursor drawing and changes the derived `server_ident`.
    #[arg(short = 'n', long)]
    pub nest: bool,

    /// Path of the listening socket new clients connect to.
    #[arg(long, default_value = "/tmp/compositor.sock")]
    pub socket: String,

    /// Command (and arguments) to launch as the first client once the
    /// socket is bound. Passed through to `execvp` with no shell
    /// interpretation. Defaults to the user's login shell.
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}

/// A parsed `WIDTHxHEIGHT` screen size.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
}

fn parse_geometry(s: &str) -> Result<Geometry, String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let width: u32 = w.parse().map_err(|_| format!("bad width {w:?}"))?;
    let height: u32 = h.parse().map_err(|_| format!("bad height {h:?}"))?;
    if width == 0 || height == 0 {
        return Err("screen dimensions must be nonzero".into());
    }
    Ok(Geometry { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_geometry() {
        let g = parse_geometry("1920x1080").unwrap();
        assert_eq!((g.width, g.height), (1920, 1080));
    }

    #[test]
    fn rejects_malformed_geometry() {
        assert!(parse_geometry("1920").is_err());
        assert!(parse_geometry("0x600").is_err());
        assert!(parse_geometry("widexhigh").is_err());
    }
}
