//! Port list parsing: `1080`, `1080,8080`, `8000-8010` and mixes of them.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("invalid port '{0}'")]
    Invalid(String),
    #[error("port 0 is not scannable")]
    Zero,
    #[error("inverted port range '{0}'")]
    Inverted(String),
}

/// Parses a port specification, keeping the order in which ports are given.
pub fn parse_ports(spec: &str) -> Result<Vec<u16>, PortError> {
    let mut ports: Vec<u16> = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_port(start.trim())?;
                let end = parse_port(end.trim())?;
                if start > end {
                    return Err(PortError::Inverted(part.to_string()));
                }
                ports.extend(start..=end);
            }
            None => ports.push(parse_port(part)?),
        }
    }

    Ok(ports)
}

fn parse_port(s: &str) -> Result<u16, PortError> {
    let port = s.parse::<u16>().map_err(|_| PortError::Invalid(s.to_string()))?;
    if port == 0 {
        return Err(PortError::Zero);
    }
    Ok(port)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
