//! Image domain — inspect, layer ancestry.

use super::client::{DockerClient, DockerError};

impl DockerClient {
    /// Inspect a specific image by ID or tag.
    pub async fn inspect_image(
        &self,
        image_id: &str,
    ) -> Result<bollard::models::ImageInspect, DockerError> {
        self.client
            .inspect_image(image_id)
            .await
            .map_err(DockerError::from)
    }

    /// Layer-id chain for an image, bottom (oldest) to top (newest), as
    /// reported by `docker history`. Used for the ancestry check.
    pub async fn image_layers(&self, image: &str) -> Result<Vec<String>, DockerError> {
        let history = self
            .client
            .image_history(image)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    DockerError::ImageNotFound(image.to_string())
                }
                other => DockerError::BollardError(other),
            })?;
        // bollard returns newest-first; reverse to bottom-to-top.
        Ok(history.into_iter().rev().map(|h| h.id).collect())
    }
}
