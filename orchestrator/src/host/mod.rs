//! Container host management over the Docker engine API
//!
//! Lifecycle, image, volume and network operations used by the REST API.
//! Engine payloads are projected onto the view models in [`crate::models`].

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Instant;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, PruneContainersOptions, RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, EndpointSettings, ImageSummary, Network, Port,
    Volume,
};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, ListNetworksOptions};
use bollard::volume::{ListVolumesOptions, PruneVolumesOptions, RemoveVolumeOptions};
use bollard::Docker;
use chrono::{DateTime, TimeZone, Utc};
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::models::{
    ContainerView, DashboardSummary, ImageView, NetworkView, PruneResponse, RecreateResponse,
    VolumeView,
};

/// Container log output, one line per item
pub type LogLines = Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>;

/// Errors from host management operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Container engine unavailable: {0}")]
    Unavailable(String),

    #[error("Container engine error: {0}")]
    Engine(String),
}

impl From<DockerError> for HostError {
    fn from(err: DockerError) -> Self {
        match err {
            DockerError::DockerResponseServerError {
                status_code: 404,
                message,
            } => HostError::NotFound(message),
            DockerError::DockerResponseServerError {
                status_code: 409,
                message,
            } => HostError::Conflict(message),
            DockerError::DockerResponseServerError {
                status_code: 400,
                message,
            } => HostError::InvalidInput(message),
            DockerError::IOError { .. }
            | DockerError::HyperResponseError { .. }
            | DockerError::RequestTimeoutError => HostError::Unavailable(err.to_string()),
            other => HostError::Engine(other.to_string()),
        }
    }
}

/// Await an engine call, recording its latency and outcome
async fn timed<T>(
    operation: &'static str,
    call: impl Future<Output = Result<T, DockerError>>,
) -> Result<T, HostError> {
    let started = Instant::now();
    let result = call.await;
    crate::metrics::record_engine_request(
        operation,
        started.elapsed().as_secs_f64(),
        result.is_ok(),
    );
    result.map_err(HostError::from)
}

/// Docker host operations
#[derive(Clone)]
pub struct DockerHost {
    docker: Docker,
}

impl DockerHost {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Engine version, `None` when the engine does not answer
    pub async fn version(&self) -> Option<String> {
        if let Err(e) = self.docker.ping().await {
            debug!(error = %e, "Docker ping failed");
            return None;
        }
        match self.docker.version().await {
            Ok(version) => version.version,
            Err(e) => {
                debug!(error = %e, "Docker version query failed");
                None
            }
        }
    }

    // ========================================================================
    // Containers
    // ========================================================================

    pub async fn list_containers(&self, all: bool) -> Result<Vec<ContainerView>, HostError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = timed(
            "list_containers",
            self.docker.list_containers(Some(options)),
        )
        .await?;

        Ok(containers.into_iter().map(container_view).collect())
    }

    /// Counts by state and per image over every container on the host
    pub async fn dashboard(&self) -> Result<DashboardSummary, HostError> {
        let containers = self.list_containers(true).await?;
        Ok(summarize(containers))
    }

    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, HostError> {
        timed(
            "inspect_container",
            self.docker
                .inspect_container(id, None::<InspectContainerOptions>),
        )
        .await
    }

    pub async fn start_container(&self, id: &str) -> Result<(), HostError> {
        timed(
            "start_container",
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>),
        )
        .await?;
        info!(container_id = %id, "Container started");
        Ok(())
    }

    pub async fn stop_container(&self, id: &str) -> Result<(), HostError> {
        timed(
            "stop_container",
            self.docker.stop_container(id, None::<StopContainerOptions>),
        )
        .await?;
        info!(container_id = %id, "Container stopped");
        Ok(())
    }

    pub async fn restart_container(&self, id: &str) -> Result<(), HostError> {
        timed(
            "restart_container",
            self.docker
                .restart_container(id, None::<RestartContainerOptions>),
        )
        .await?;
        info!(container_id = %id, "Container restarted");
        Ok(())
    }

    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), HostError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        timed(
            "remove_container",
            self.docker.remove_container(id, Some(options)),
        )
        .await?;
        info!(container_id = %id, force, "Container removed");
        Ok(())
    }

    /// Delete every stopped container
    pub async fn prune_containers(&self) -> Result<PruneResponse, HostError> {
        let pruned = timed(
            "prune_containers",
            self.docker
                .prune_containers(None::<PruneContainersOptions<String>>),
        )
        .await?;

        Ok(PruneResponse {
            deleted: pruned.containers_deleted.unwrap_or_default(),
            space_reclaimed_bytes: pruned.space_reclaimed.unwrap_or(0).max(0) as u64,
        })
    }

    /// Create and start a fresh container from `image` with a tty attached
    pub async fn recreate_from_image(&self, image: &str) -> Result<RecreateResponse, HostError> {
        if image.trim().is_empty() {
            return Err(HostError::InvalidInput("Image name is required".into()));
        }

        let name = recreated_name();
        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };
        let config = Config {
            image: Some(image.to_string()),
            tty: Some(true),
            ..Default::default()
        };

        let created = timed(
            "create_container",
            self.docker.create_container(Some(options), config),
        )
        .await?;
        self.start_container(&created.id).await?;

        info!(container_id = %created.id, image = %image, name = %name, "Container recreated from image");
        Ok(RecreateResponse {
            container_id: created.id,
            name,
        })
    }

    /// Stream log lines from stdout and stderr
    pub fn log_lines(&self, id: &str, follow: bool, tail: &str) -> LogLines {
        let options = LogsOptions::<String> {
            follow,
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        let bytes = Box::pin(self.docker.logs(id, Some(options)).map(|frame| {
            frame
                .map(LogOutput::into_bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        }));

        let lines = StreamReader::new(bytes).lines();
        Box::pin(futures::stream::unfold(Some(lines), |state| async move {
            let mut lines = state?;
            match lines.next_line().await {
                Ok(Some(line)) => Some((Ok(line), Some(lines))),
                Ok(None) => None,
                // surface the error once, then end the stream
                Err(e) => Some((Err(e), None)),
            }
        }))
    }

    // ========================================================================
    // Images
    // ========================================================================

    pub async fn list_images(&self) -> Result<Vec<ImageView>, HostError> {
        let options = ListImagesOptions::<String> {
            all: true,
            ..Default::default()
        };
        let images = timed("list_images", self.docker.list_images(Some(options))).await?;
        Ok(images.into_iter().map(image_view).collect())
    }

    /// Pull an image, waiting for the pull to complete
    pub async fn pull_image(&self, reference: &str) -> Result<(), HostError> {
        let (repository, tag) = split_image_reference(reference)?;
        let options = CreateImageOptions {
            from_image: repository.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        info!(image = %reference, "Pulling image");
        let started = Instant::now();
        let mut progress = Box::pin(self.docker.create_image(Some(options), None, None));

        while let Some(item) = progress.next().await {
            match item {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image = %reference, status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    crate::metrics::record_engine_request(
                        "pull_image",
                        started.elapsed().as_secs_f64(),
                        false,
                    );
                    return Err(HostError::from(e));
                }
            }
        }

        crate::metrics::record_engine_request("pull_image", started.elapsed().as_secs_f64(), true);
        info!(image = %reference, "Image pulled");
        Ok(())
    }

    pub async fn remove_image(&self, name: &str, force: bool) -> Result<(), HostError> {
        let options = RemoveImageOptions {
            force,
            ..Default::default()
        };
        timed(
            "remove_image",
            self.docker.remove_image(name, Some(options), None),
        )
        .await?;
        info!(image = %name, force, "Image removed");
        Ok(())
    }

    // ========================================================================
    // Volumes
    // ========================================================================

    pub async fn list_volumes(&self) -> Result<Vec<VolumeView>, HostError> {
        let listed = timed(
            "list_volumes",
            self.docker.list_volumes(None::<ListVolumesOptions<String>>),
        )
        .await?;

        Ok(listed
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(volume_view)
            .collect())
    }

    /// Remove a volume, even if it is still referenced
    pub async fn remove_volume(&self, name: &str) -> Result<(), HostError> {
        timed(
            "remove_volume",
            self.docker
                .remove_volume(name, Some(RemoveVolumeOptions { force: true })),
        )
        .await?;
        info!(volume = %name, "Volume removed");
        Ok(())
    }

    /// Remove every unused volume
    pub async fn prune_volumes(&self) -> Result<PruneResponse, HostError> {
        let pruned = timed(
            "prune_volumes",
            self.docker.prune_volumes(None::<PruneVolumesOptions<String>>),
        )
        .await?;

        Ok(PruneResponse {
            deleted: pruned.volumes_deleted.unwrap_or_default(),
            space_reclaimed_bytes: pruned.space_reclaimed.unwrap_or(0).max(0) as u64,
        })
    }

    // ========================================================================
    // Networks
    // ========================================================================

    pub async fn list_networks(&self) -> Result<Vec<NetworkView>, HostError> {
        let networks = timed(
            "list_networks",
            self.docker.list_networks(None::<ListNetworksOptions<String>>),
        )
        .await?;
        Ok(networks.into_iter().map(network_view).collect())
    }

    pub async fn create_network(&self, name: &str, driver: &str) -> Result<(), HostError> {
        if name.trim().is_empty() {
            return Err(HostError::InvalidInput("Network name is required".into()));
        }

        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: driver.to_string(),
            ..Default::default()
        };
        timed("create_network", self.docker.create_network(options)).await?;
        info!(network = %name, driver = %driver, "Network created");
        Ok(())
    }

    pub async fn remove_network(&self, id: &str) -> Result<(), HostError> {
        timed("remove_network", self.docker.remove_network(id)).await?;
        info!(network = %id, "Network removed");
        Ok(())
    }

    pub async fn connect_network(&self, network: &str, container: &str) -> Result<(), HostError> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings::default(),
        };
        timed("connect_network", self.docker.connect_network(network, options)).await?;
        info!(network = %network, container_id = %container, "Container connected to network");
        Ok(())
    }
}

fn recreated_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("recreated_{}", &id[..12])
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Split `repo[:tag]` into repository and tag, defaulting to `latest`
///
/// A colon inside the registry host (`localhost:5000/app`) is not a tag
/// separator.
pub fn split_image_reference(reference: &str) -> Result<(&str, &str), HostError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(HostError::InvalidInput("Image name is required".into()));
    }

    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') && !repo.is_empty() && !tag.is_empty() => {
            Ok((repo, tag))
        }
        _ => Ok((reference, "latest")),
    }
}

/// Format a published port as `ip:public -> private`
pub fn format_port(port: &Port) -> String {
    match port.public_port {
        Some(public) => format!(
            "{}:{} -> {}",
            port.ip.as_deref().unwrap_or("0.0.0.0"),
            public,
            port.private_port
        ),
        None => port.private_port.to_string(),
    }
}

fn container_view(summary: ContainerSummary) -> ContainerView {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_default();

    ContainerView {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_default(),
        state: summary.state.unwrap_or_default(),
        status: summary.status.unwrap_or_default(),
        created_at: summary.created.and_then(timestamp),
        ports: summary
            .ports
            .unwrap_or_default()
            .iter()
            .map(format_port)
            .collect(),
    }
}

/// Build dashboard counts from a full container listing
pub fn summarize(containers: Vec<ContainerView>) -> DashboardSummary {
    let mut image_usage = BTreeMap::new();
    let mut running = 0;
    let mut exited = 0;

    for container in &containers {
        match container.state.as_str() {
            "running" => running += 1,
            "exited" => exited += 1,
            _ => {}
        }
        *image_usage.entry(container.image.clone()).or_insert(0) += 1;
    }

    DashboardSummary {
        total_containers: containers.len(),
        running,
        exited,
        image_usage,
        containers,
    }
}

fn image_view(image: ImageSummary) -> ImageView {
    ImageView {
        id: image.id,
        tags: image.repo_tags,
        size_bytes: image.size,
        created_at: timestamp(image.created),
    }
}

fn volume_view(volume: Volume) -> VolumeView {
    VolumeView {
        name: volume.name,
        driver: volume.driver,
        mountpoint: volume.mountpoint,
    }
}

fn network_view(network: Network) -> NetworkView {
    NetworkView {
        id: network.id.unwrap_or_default(),
        name: network.name.unwrap_or_default(),
        driver: network.driver.unwrap_or_default(),
        scope: network.scope.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn container(image: &str, state: &str) -> ContainerView {
        ContainerView {
            id: format!("{}-{}", image, state),
            name: image.to_string(),
            image: image.to_string(),
            state: state.to_string(),
            status: String::new(),
            created_at: None,
            ports: vec![],
        }
    }

    #[test]
    fn test_split_image_reference() {
        assert_eq!(split_image_reference("nginx").unwrap(), ("nginx", "latest"));
        assert_eq!(
            split_image_reference("redis:7-alpine").unwrap(),
            ("redis", "7-alpine")
        );
        assert_eq!(
            split_image_reference("localhost:5000/app").unwrap(),
            ("localhost:5000/app", "latest")
        );
        assert_eq!(
            split_image_reference("localhost:5000/app:v2").unwrap(),
            ("localhost:5000/app", "v2")
        );
        assert!(split_image_reference("  ").is_err());
    }

    #[test]
    fn test_format_port() {
        let published = Port {
            ip: Some("0.0.0.0".into()),
            private_port: 80,
            public_port: Some(8080),
            ..Default::default()
        };
        assert_eq!(format_port(&published), "0.0.0.0:8080 -> 80");

        let exposed = Port {
            private_port: 5432,
            ..Default::default()
        };
        assert_eq!(format_port(&exposed), "5432");
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(vec![
            container("nginx", "running"),
            container("nginx", "exited"),
            container("redis", "running"),
            container("redis", "created"),
        ]);

        assert_eq!(summary.total_containers, 4);
        assert_eq!(summary.running, 2);
        assert_eq!(summary.exited, 1);
        assert_eq!(summary.image_usage.get("nginx"), Some(&2));
        assert_eq!(summary.image_usage.get("redis"), Some(&2));
    }

    #[test]
    fn test_container_view_projection() {
        let summary = ContainerSummary {
            id: Some("abc123".into()),
            names: Some(vec!["/web".into()]),
            image: Some("nginx:latest".into()),
            state: Some("running".into()),
            status: Some("Up 2 minutes".into()),
            created: Some(0),
            ..Default::default()
        };

        let view = container_view(summary);
        assert_eq!(view.name, "web");
        assert_eq!(view.state, "running");
        assert_eq!(view.created_at, timestamp(0));
        assert!(view.ports.is_empty());
    }

    #[test]
    fn test_error_classification() {
        let err = HostError::from(DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such image".into(),
        });
        assert!(matches!(err, HostError::NotFound(_)));

        let err = HostError::from(DockerError::DockerResponseServerError {
            status_code: 409,
            message: "volume is in use".into(),
        });
        assert!(matches!(err, HostError::Conflict(_)));

        let err = HostError::from(DockerError::RequestTimeoutError);
        assert!(matches!(err, HostError::Unavailable(_)));
    }

    #[test]
    fn test_recreated_name() {
        let name = recreated_name();
        assert!(name.starts_with("recreated_"));
        assert_eq!(name.len(), "recreated_".len() + 12);
    }
}
