mod spz;

use tg_core::gaussian_cloud::GaussianCloud;
use tg_core::positioning::align_and_fit;
use tracing::{debug, info, warn};
use crate::error::{DecodeError, ImportError, SceneError};
use crate::job::GenerationParams;
use crate::scene::{ObjectHandle, SceneBackend};

pub use spz::SpzDecoder;

/// Turns a downloaded result payload into a PLY buffer
pub trait Decoder {
    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, DecodeError>;
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
        (**self).decode(payload)
    }
}

/// Accepts payloads that are already PLY streams
#[derive(Debug, Clone, Copy, Default)]
pub struct PlyDecoder;

impl Decoder for PlyDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
        if payload.starts_with(b"ply\n") || payload.starts_with(b"ply\r\n") {
            Ok(payload.to_vec())
        } else {
            let magic: String = payload
                .iter()
                .take(4)
                .map(|b| if b.is_ascii_graphic() { *b as char } else { '.' })
                .collect();
            Err(DecodeError(format!("unrecognized payload format (starts with `{magic}`)")))
        }
    }
}

/// A finished task's result on its way into the scene
#[derive(Debug)]
pub struct ImportRequest<'a> {
    pub task_id: &'a str,
    pub payload: &'a [u8],
    pub params: &'a GenerationParams,
    /// Existing object the result takes the place of
    pub replace_target: Option<&'a ObjectHandle>,
}

pub trait Importer {
    fn import(&mut self, request: ImportRequest<'_>) -> Result<ObjectHandle, ImportError>;
}

pub struct ImportPipeline<S, D> {
    scene: S,
    decoder: D,
}

impl<S: SceneBackend, D: Decoder> ImportPipeline<S, D> {
    pub fn new(scene: S, decoder: D) -> Self {
        Self { scene, decoder }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    /// Mesh conversion and replacement. Every object created along the way is
    /// recorded in `created`; nothing that existed before is removed until the
    /// new object is fully placed.
    fn place(
        &mut self,
        splat: &ObjectHandle,
        request: &ImportRequest<'_>,
        created: &mut Vec<ObjectHandle>,
    ) -> Result<ObjectHandle, ImportError> {
        let params = request.params;
        let convert = params.kind.needs_conversion();

        let object = if convert {
            let mesh = self.scene.convert_to_mesh(splat, &params.mesh)?;
            created.push(mesh.clone());

            if params.mesh.keep_original {
                let mut transform = self.scene.transform(&mesh)?;
                let width = transform.dimensions(&self.scene.bounds(&mesh)?).x;
                transform.translation.x += width;
                self.scene.set_transform(&mesh, transform)?;
            }
            mesh
        } else {
            splat.clone()
        };

        if let Some(target) = request.replace_target {
            let placed = align_and_fit(
                &self.scene.transform(target)?,
                &self.scene.bounds(target)?,
                &self.scene.bounds(&object)?,
            );
            self.scene.set_transform(&object, placed)?;
        }

        if convert && !params.mesh.keep_original {
            self.scene.remove(splat)?;
        }
        if let Some(target) = request.replace_target {
            self.scene.remove(target)?;
            info!("Replaced {} with {}", target, object);
        }

        Ok(object)
    }

    /// Takes back the objects a failed import left in the scene
    fn discard(&mut self, created: &[ObjectHandle]) {
        for object in created.iter().rev() {
            match self.scene.remove(object) {
                Ok(()) => debug!("Discarded {} after failed import", object),
                Err(SceneError::ObjectNotFound(_)) => {}
                Err(e) => warn!("Could not discard {}: {}", object, e),
            }
        }
    }
}

impl<S: SceneBackend, D: Decoder> Importer for ImportPipeline<S, D> {
    fn import(&mut self, request: ImportRequest<'_>) -> Result<ObjectHandle, ImportError> {
        let ply = self.decoder.decode(request.payload)?;
        let cloud = GaussianCloud::from_ply_bytes(&ply)?;

        debug!("Task {}: decoded {} gaussians", request.task_id, cloud.count);

        let name = format!("splat_{}", request.task_id.chars().take(8).collect::<String>());
        let splat = self.scene.create_splat(&name, &cloud)?;

        let mut created = vec![splat.clone()];
        match self.place(&splat, &request, &mut created) {
            Ok(object) => Ok(object),
            Err(e) => {
                self.discard(&created);
                Err(e)
            }
        }
    }
}
