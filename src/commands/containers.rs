//! Container runtime commands (`docker`).

use crate::host_command::HostCommand;

/// `docker run -d` with a restart policy.
#[derive(Debug, Clone, Default)]
pub struct DockerRun {
    pub name: String,
    pub image: String,
    /// `host:container` port mappings
    pub ports: Vec<String>,
    /// `source:target` volume mappings
    pub volumes: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Extra arguments passed to the container entrypoint
    pub command: Vec<String>,
}

impl HostCommand for DockerRun {
    fn program(&self) -> &'static str {
        "docker"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--restart".to_string(),
            "unless-stopped".to_string(),
        ];
        for port in &self.ports {
            args.push("-p".to_string());
            args.push(port.clone());
        }
        for volume in &self.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

/// `docker rm -f <name>`; fails harmlessly if the container does not exist.
#[derive(Debug, Clone)]
pub struct DockerRemove {
    pub name: String,
}

impl HostCommand for DockerRemove {
    fn program(&self) -> &'static str {
        "docker"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["rm".to_string(), "-f".to_string(), self.name.clone()]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

/// `docker volume create <name>` (idempotent in docker itself).
#[derive(Debug, Clone)]
pub struct DockerVolumeCreate {
    pub name: String,
}

impl HostCommand for DockerVolumeCreate {
    fn program(&self) -> &'static str {
        "docker"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["volume".to_string(), "create".to_string(), self.name.clone()]
    }

    fn is_mutating(&self) -> bool {
        true
    }
}
