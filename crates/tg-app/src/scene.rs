use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tg_core::gaussian_cloud::GaussianCloud;
use tg_core::positioning::Transform;
use tg_core::BoundingBox;
use tracing::{debug, info};
use crate::error::SceneError;
use crate::job::MeshSettings;

const MANIFEST: &str = "scene.json";

/// Name of an object living in the scene
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle(String);

impl ObjectHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The scene operations the import pipeline relies on
pub trait SceneBackend {
    /// Adds a splat object, picking a free name based on `name`
    fn create_splat(&mut self, name: &str, cloud: &GaussianCloud) -> Result<ObjectHandle, SceneError>;

    /// Builds a textured mesh from a splat object, leaving the splat in place
    fn convert_to_mesh(&mut self, splat: &ObjectHandle, settings: &MeshSettings) -> Result<ObjectHandle, SceneError>;

    /// Local-space bounds
    fn bounds(&self, object: &ObjectHandle) -> Result<BoundingBox, SceneError>;

    fn transform(&self, object: &ObjectHandle) -> Result<Transform, SceneError>;

    fn set_transform(&mut self, object: &ObjectHandle, transform: Transform) -> Result<(), SceneError>;

    fn remove(&mut self, object: &ObjectHandle) -> Result<(), SceneError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneObject {
    path: PathBuf,
    bounds: BoundingBox,
    transform: Transform,
    /// Files written by the scene itself; loaded files are never deleted
    owned: bool,
    #[serde(skip)]
    cloud: Option<GaussianCloud>,
}

/// Headless scene that keeps objects as PLY files in a directory.
///
/// Splats are written as-is. Mesh conversion produces a vertex-colored point
/// mesh decimated to the voxel size, since surfacing, unwrapping and baking
/// need a full 3D host. Transforms live in `scene.json` next to the files.
#[derive(Debug)]
pub struct DiskScene {
    root: PathBuf,
    objects: BTreeMap<ObjectHandle, SceneObject>,
}

impl DiskScene {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SceneError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        info!("Scene output directory: {}", root.display());

        Ok(Self {
            root,
            objects: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, object: &ObjectHandle) -> Option<&Path> {
        self.objects.get(object).map(|o| o.path.as_path())
    }

    pub fn contains(&self, object: &ObjectHandle) -> bool {
        self.objects.contains_key(object)
    }

    /// Registers an existing splat PLY, e.g. as a replacement target
    pub fn load_object(&mut self, path: &Path) -> Result<ObjectHandle, SceneError> {
        let cloud = GaussianCloud::from_ply(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Object".to_string());

        let handle = self.unique_handle(&stem);
        self.objects.insert(
            handle.clone(),
            SceneObject {
                path: path.to_path_buf(),
                bounds: cloud.bounds()?,
                transform: Transform::IDENTITY,
                owned: false,
                cloud: Some(cloud),
            },
        );
        self.write_manifest()?;

        debug!("Loaded {} from {}", handle, path.display());
        Ok(handle)
    }

    fn unique_handle(&self, base: &str) -> ObjectHandle {
        let mut handle = ObjectHandle::new(base);
        let mut n = 1;
        while self.objects.contains_key(&handle) || self.root.join(format!("{handle}.ply")).exists() {
            handle = ObjectHandle::new(format!("{base}.{n:03}"));
            n += 1;
        }
        handle
    }

    fn object(&self, object: &ObjectHandle) -> Result<&SceneObject, SceneError> {
        self.objects
            .get(object)
            .ok_or_else(|| SceneError::ObjectNotFound(object.to_string()))
    }

    fn insert_owned(&mut self, base: &str, bytes: &[u8], cloud: GaussianCloud) -> Result<ObjectHandle, SceneError> {
        let handle = self.unique_handle(base);
        let path = self.root.join(format!("{handle}.ply"));
        fs::write(&path, bytes)?;

        self.objects.insert(
            handle.clone(),
            SceneObject {
                path,
                bounds: cloud.bounds()?,
                transform: Transform::IDENTITY,
                owned: true,
                cloud: Some(cloud),
            },
        );
        self.write_manifest()?;

        Ok(handle)
    }

    fn write_manifest(&self) -> Result<(), SceneError> {
        let manifest = serde_json::to_vec_pretty(&self.objects)?;
        fs::write(self.root.join(MANIFEST), manifest)?;
        Ok(())
    }
}

impl SceneBackend for DiskScene {
    fn create_splat(&mut self, name: &str, cloud: &GaussianCloud) -> Result<ObjectHandle, SceneError> {
        let handle = self.insert_owned(name, &cloud.to_ply_bytes(), cloud.clone())?;
        info!("Created splat {} with {} gaussians", handle, cloud.count);
        Ok(handle)
    }

    fn convert_to_mesh(&mut self, splat: &ObjectHandle, settings: &MeshSettings) -> Result<ObjectHandle, SceneError> {
        let source = self.object(splat)?;
        let cloud = match &source.cloud {
            Some(cloud) => cloud.clone(),
            None => GaussianCloud::from_ply(&source.path)?,
        };
        let transform = source.transform;

        let points = cloud.decimated(settings.voxel_size);
        debug!(
            "Meshing {} at voxel size {}: {} of {} points kept",
            splat, settings.voxel_size, points.count, cloud.count
        );

        let handle = self.insert_owned(&format!("{splat}_mesh"), &points.to_point_mesh_ply_bytes(), points)?;
        self.set_transform(&handle, transform)?;

        info!("Converted {} to mesh {}", splat, handle);
        Ok(handle)
    }

    fn bounds(&self, object: &ObjectHandle) -> Result<BoundingBox, SceneError> {
        Ok(self.object(object)?.bounds)
    }

    fn transform(&self, object: &ObjectHandle) -> Result<Transform, SceneError> {
        Ok(self.object(object)?.transform)
    }

    fn set_transform(&mut self, object: &ObjectHandle, transform: Transform) -> Result<(), SceneError> {
        let entry = self
            .objects
            .get_mut(object)
            .ok_or_else(|| SceneError::ObjectNotFound(object.to_string()))?;
        entry.transform = transform;
        self.write_manifest()
    }

    fn remove(&mut self, object: &ObjectHandle) -> Result<(), SceneError> {
        let entry = self
            .objects
            .remove(object)
            .ok_or_else(|| SceneError::ObjectNotFound(object.to_string()))?;

        if entry.owned {
            fs::remove_file(&entry.path)?;
        }
        self.write_manifest()?;

        debug!("Removed {} from scene", object);
        Ok(())
    }
}
