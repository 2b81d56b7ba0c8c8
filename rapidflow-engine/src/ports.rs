//! Docker-style port mapping parser
//!
//! Supports "3000", "8080:3000", and "0.0.0.0:8080:3000".

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid port mapping format: {spec}")]
pub struct PortParseError {
    pub spec: String,
}

/// One host-to-container port binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_ip: String,
    pub host_port: String,
    pub container_port: String,
}

impl PortMapping {
    /// Renders the binding back to the canonical `ip:host:container` form.
    pub fn render(&self) -> String {
        format!("{}:{}:{}", self.host_ip, self.host_port, self.container_port)
    }
}

pub fn parse_port_mapping(spec: &str) -> Result<PortMapping, PortParseError> {
    let parts: Vec<&str> = spec.split(':').collect();

    let (host_ip, host_port, container_port) = match parts.as_slice() {
        [port] => ("0.0.0.0", *port, *port),
        [host, container] => ("0.0.0.0", *host, *container),
        [ip, host, container] => (*ip, *host, *container),
        _ => {
            return Err(PortParseError {
                spec: spec.to_string(),
            });
        }
    };

    Ok(PortMapping {
        host_ip: host_ip.to_string(),
        host_port: host_port.to_string(),
        container_port: container_port.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_port() {
        let mapping = parse_port_mapping("3000").unwrap();
        assert_eq!(mapping.host_ip, "0.0.0.0");
        assert_eq!(mapping.host_port, "3000");
        assert_eq!(mapping.container_port, "3000");
    }

    #[test]
    fn test_host_container() {
        let mapping = parse_port_mapping("8080:3000").unwrap();
        assert_eq!(mapping.host_ip, "0.0.0.0");
        assert_eq!(mapping.host_port, "8080");
        assert_eq!(mapping.container_port, "3000");
    }

    #[test]
    fn test_ip_host_container() {
        let mapping = parse_port_mapping("127.0.0.1:8080:3000").unwrap();
        assert_eq!(mapping.host_ip, "127.0.0.1");
        assert_eq!(mapping.host_port, "8080");
        assert_eq!(mapping.container_port, "3000");
    }

    #[test]
    fn test_too_many_parts() {
        assert!(parse_port_mapping("a:b:c:d").is_err());
    }

    #[test]
    fn test_empty_segments_parse() {
        // Validity is defined purely by token count.
        let mapping = parse_port_mapping(":3000").unwrap();
        assert_eq!(mapping.host_port, "");
        assert_eq!(mapping.container_port, "3000");

        let mapping = parse_port_mapping("8080:").unwrap();
        assert_eq!(mapping.host_port, "8080");
        assert_eq!(mapping.container_port, "");

        let mapping = parse_port_mapping("").unwrap();
        assert_eq!(mapping.host_ip, "0.0.0.0");
        assert_eq!(mapping.host_port, "");
    }

    #[test]
    fn test_render_roundtrip() {
        for spec in ["3000", "8080:3000", "10.0.0.1:8080:3000"] {
            let mapping = parse_port_mapping(spec).unwrap();
            let rendered = mapping.render();
            assert_eq!(parse_port_mapping(&rendered).unwrap(), mapping);
        }
    }
}
