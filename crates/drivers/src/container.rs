//! The container driver: creates, runs, waits on, and collects logs from a
//! container image via the Docker Engine API.

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions,
};
use bollard::Docker;
use bytes::{Bytes, BytesMut};
use cmdgate_core::{Command, DriverError, Environment};
use futures::StreamExt;
use tracing::debug;

use crate::driver::{Driver, Output, Streams};

/// Runs `command.image` as a one-shot container. If `command.command` is
/// non-empty it is tokenized with shell-word rules and passed as the
/// container's entrypoint argv. The container is always removed after its
/// logs have been collected, win or lose.
pub struct ContainerDriver {
    docker: Docker,
}

impl ContainerDriver {
    pub fn connect() -> Result<Self, DriverError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DriverError::Container(e.to_string()))?;
        Ok(Self { docker })
    }

    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl Driver for ContainerDriver {
    async fn execute(
        &self,
        command: &Command,
        env: &Environment,
        streams: Streams,
    ) -> Result<Output, DriverError> {
        let _ = streams; // containers in this model take no stdin
        let cmd_argv = if command.command.is_empty() {
            None
        } else {
            Some(
                shell_words::split(&command.command)
                    .map_err(|e| DriverError::InvalidCommandSyntax(e.to_string()))?,
            )
        };

        let container_name = format!("cmdgate-{}", uuid::Uuid::new_v4());
        let options = CreateContainerOptions {
            name: container_name.clone(),
            platform: None,
        };
        let config = ContainerConfig {
            image: Some(command.image.clone()),
            cmd: cmd_argv,
            env: Some(
                env.to_envp()
                    .into_iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect(),
            ),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| DriverError::Container(e.to_string()))?;
        debug!(container = %created.id, image = %command.image, "created container");

        let result = run_container(&self.docker, &created.id).await;

        // Always remove the container after log collection, regardless of
        // how it exited.
        let _ = self
            .docker
            .remove_container(
                &created.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        debug!(container = %created.id, "removed container");

        result
    }
}

async fn run_container(docker: &Docker, container_id: &str) -> Result<Output, DriverError> {
    docker
        .start_container::<String>(container_id, None)
        .await
        .map_err(|e| DriverError::Container(e.to_string()))?;

    let mut wait_stream = docker.wait_container::<String>(container_id, None);
    let wait_result = wait_stream
        .next()
        .await
        .ok_or_else(|| DriverError::Container("container exited without a status".to_string()))?
        .map_err(|e| DriverError::Container(e.to_string()))?;

    let mut stdout = BytesMut::new();
    let mut stderr = BytesMut::new();
    let mut log_stream = docker.logs::<String>(
        container_id,
        Some(LogsOptions {
            stdout: true,
            stderr: true,
            ..Default::default()
        }),
    );
    while let Some(chunk) = log_stream.next().await {
        match chunk.map_err(|e| DriverError::Container(e.to_string()))? {
            LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
            LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
            _ => {}
        }
    }

    Ok(Output {
        status: wait_result.status_code,
        stdout: Bytes::from(stdout),
        stderr: Bytes::from(stderr),
    })
}
