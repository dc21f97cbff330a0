//! Container runtime and container-management UI.

use super::services::PackageService;
use super::{FeatureAction, StepContext};
use crate::commands::containers::{DockerRemove, DockerRun, DockerVolumeCreate};
use anyhow::Result;

pub const DOCKER: PackageService = PackageService {
    packages: &["docker.io"],
    units: &["docker.service"],
};

pub const PORTAINER_PORT: u16 = 9443;
const PORTAINER_IMAGE: &str = "portainer/portainer-ce:latest";

pub struct Portainer;

impl FeatureAction for Portainer {
    fn install(&self, ctx: &StepContext) -> Result<()> {
        let host = ctx.host;
        host.run_checked(&DockerVolumeCreate {
            name: "portainer_data".to_string(),
        })?;
        host.run_tolerant(&DockerRemove {
            name: "portainer".to_string(),
        });
        host.run_checked(&DockerRun {
            name: "portainer".to_string(),
            image: PORTAINER_IMAGE.to_string(),
            ports: vec![format!("{0}:{0}", PORTAINER_PORT)],
            volumes: vec![
                "/var/run/docker.sock:/var/run/docker.sock".to_string(),
                "portainer_data:/data".to_string(),
            ],
            ..Default::default()
        })?;
        Ok(())
    }

    /// The data volume is kept so a re-run keeps the admin account.
    fn rollback(&self, ctx: &StepContext) -> Result<()> {
        ctx.host.run_tolerant(&DockerRemove {
            name: "portainer".to_string(),
        });
        Ok(())
    }
}
