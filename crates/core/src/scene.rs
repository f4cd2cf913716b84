//! Scene object table.
//!
//! Objects live in an arena and are addressed by [`ObjectHandle`]. Handles are never reused
//! within a scene, so a handle to a removed object stays invalid instead of aliasing a newer
//! object. Every transform or mesh mutation bumps the object's revision; caches keyed by
//! handle compare revisions to detect stale entries.

use crate::error::{Error, Result};
use crate::geometry::TriangleMesh;
use crate::rigid_body::RigidBodySettings;
use crate::transform::{Pose, Transform3D};
use nalgebra::{Point3, Vector3};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Typed index of an object in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectHandle(u32);

impl ObjectHandle {
    /// Builds a handle from a raw arena index.
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// The raw arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An object that can be placed: a named mesh with a world transform.
#[derive(Debug, Clone)]
pub struct PlaceableObject {
    name: String,
    mesh: TriangleMesh,
    transform: Transform3D,
    rigid_body: Option<RigidBodySettings>,
    revision: u64,
}

impl PlaceableObject {
    /// Object name, unique within its scene.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local-space mesh.
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// World transform.
    pub fn transform(&self) -> &Transform3D {
        &self.transform
    }

    /// Location and rotation.
    pub fn pose(&self) -> Pose {
        self.transform.pose()
    }

    /// Rigid-body settings, if physics is enabled for this object.
    pub fn rigid_body(&self) -> Option<&RigidBodySettings> {
        self.rigid_body.as_ref()
    }

    /// Incremented on every transform or mesh change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// World-space vertices.
    pub fn world_vertices(&self) -> Vec<Point3<f64>> {
        self.mesh
            .vertices()
            .iter()
            .map(|v| self.transform.transform_point(v))
            .collect()
    }

    /// World-space triangles, wound so that normals point outward even under mirroring.
    pub fn world_triangles(&self) -> Vec<[Point3<f64>; 3]> {
        let vertices = self.world_vertices();
        let mirrored = self.transform.is_mirrored();
        self.mesh
            .triangles()
            .iter()
            .map(|&[a, b, c]| {
                let (a, b, c) = (a as usize, b as usize, c as usize);
                if mirrored {
                    [vertices[a], vertices[c], vertices[b]]
                } else {
                    [vertices[a], vertices[b], vertices[c]]
                }
            })
            .collect()
    }

    /// World-space position of the first mesh vertex, used as the containment sample point.
    pub fn first_world_vertex(&self) -> Option<Point3<f64>> {
        self.mesh
            .vertices()
            .first()
            .map(|v| self.transform.transform_point(v))
    }

    /// The 8 corners of the oriented bounding box in world space.
    pub fn bounding_box_corners(&self) -> [Point3<f64>; 8] {
        self.mesh
            .bounding_box_corners()
            .map(|c| self.transform.transform_point(&c))
    }

    /// Mean of the oriented bounding box corners.
    pub fn bounding_box_center(&self) -> Point3<f64> {
        let sum: Vector3<f64> = self.bounding_box_corners().iter().map(|c| c.coords).sum();
        Point3::from(sum / 8.0)
    }
}

/// Arena of placeable objects.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: Vec<Option<PlaceableObject>>,
}

impl Scene {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object with an identity transform.
    pub fn add_object(
        &mut self,
        name: impl Into<String>,
        mesh: TriangleMesh,
    ) -> Result<ObjectHandle> {
        self.add_object_with_transform(name, mesh, Transform3D::identity())
    }

    /// Adds an object with the given transform.
    pub fn add_object_with_transform(
        &mut self,
        name: impl Into<String>,
        mesh: TriangleMesh,
        transform: Transform3D,
    ) -> Result<ObjectHandle> {
        let name = name.into();
        if self.find_by_name(&name).is_some() {
            return Err(Error::DuplicateName(name));
        }
        let handle = ObjectHandle::from_index(self.objects.len());
        self.objects.push(Some(PlaceableObject {
            name,
            mesh,
            transform,
            rigid_body: None,
            revision: 0,
        }));
        Ok(handle)
    }

    /// Looks up a live object.
    pub fn object(&self, handle: ObjectHandle) -> Result<&PlaceableObject> {
        self.objects
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or(Error::NotFound(handle))
    }

    fn object_mut(&mut self, handle: ObjectHandle) -> Result<&mut PlaceableObject> {
        self.objects
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or(Error::NotFound(handle))
    }

    /// Returns true if the handle refers to a live object.
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.object(handle).is_ok()
    }

    /// Deletes an object from the scene and returns it.
    pub fn remove_object(&mut self, handle: ObjectHandle) -> Result<PlaceableObject> {
        let object = self
            .objects
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or(Error::NotFound(handle))?;
        log::debug!("removed object {} ({})", handle, object.name);
        Ok(object)
    }

    /// Handles of all live objects, in insertion order.
    pub fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_some())
            .map(|(i, _)| ObjectHandle::from_index(i))
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    /// Returns true if the scene holds no live objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds a live object by name.
    pub fn find_by_name(&self, name: &str) -> Option<ObjectHandle> {
        self.objects
            .iter()
            .position(|o| o.as_ref().is_some_and(|o| o.name == name))
            .map(ObjectHandle::from_index)
    }

    /// Current world transform.
    pub fn transform(&self, handle: ObjectHandle) -> Result<Transform3D> {
        Ok(self.object(handle)?.transform)
    }

    /// Replaces the world transform.
    pub fn set_transform(&mut self, handle: ObjectHandle, transform: Transform3D) -> Result<()> {
        let object = self.object_mut(handle)?;
        object.transform = transform;
        object.revision += 1;
        Ok(())
    }

    /// Replaces location and rotation, keeping the scale.
    pub fn set_pose(&mut self, handle: ObjectHandle, pose: Pose) -> Result<()> {
        let object = self.object_mut(handle)?;
        object.transform.set_pose(pose);
        object.revision += 1;
        Ok(())
    }

    /// Moves an object by `offset`.
    pub fn translate(&mut self, handle: ObjectHandle, offset: Vector3<f64>) -> Result<()> {
        let object = self.object_mut(handle)?;
        object.transform.location += offset;
        object.revision += 1;
        Ok(())
    }

    /// Replaces the local mesh.
    pub fn set_mesh(&mut self, handle: ObjectHandle, mesh: TriangleMesh) -> Result<()> {
        let object = self.object_mut(handle)?;
        object.mesh = mesh;
        object.revision += 1;
        Ok(())
    }

    /// World-space triangles of an object.
    pub fn world_triangles(&self, handle: ObjectHandle) -> Result<Vec<[Point3<f64>; 3]>> {
        Ok(self.object(handle)?.world_triangles())
    }

    /// World-space oriented bounding box corners of an object.
    pub fn bounding_box_corners(&self, handle: ObjectHandle) -> Result<[Point3<f64>; 8]> {
        Ok(self.object(handle)?.bounding_box_corners())
    }

    /// Enables physics participation with the given parameters.
    pub fn enable_rigid_body(
        &mut self,
        handle: ObjectHandle,
        settings: RigidBodySettings,
    ) -> Result<()> {
        if let Some(parent) = settings.compound_parent {
            if parent == handle {
                return Err(Error::InvalidConfig(format!(
                    "object {} cannot be its own compound parent",
                    handle
                )));
            }
            self.object(parent)?;
        }
        self.object_mut(handle)?.rigid_body = Some(settings);
        Ok(())
    }

    /// Disables physics participation.
    pub fn disable_rigid_body(&mut self, handle: ObjectHandle) -> Result<()> {
        self.object_mut(handle)?.rigid_body = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_and_lookup() {
        let mut scene = Scene::new();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        let b = scene.add_object("b", TriangleMesh::unit_cube()).unwrap();

        assert_eq!(scene.len(), 2);
        assert_eq!(scene.find_by_name("b"), Some(b));
        assert_eq!(scene.object(a).unwrap().name(), "a");
        assert_eq!(
            scene.add_object("a", TriangleMesh::empty()),
            Err(Error::DuplicateName("a".into()))
        );
    }

    #[test]
    fn test_removed_handle_is_not_reused() {
        let mut scene = Scene::new();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        scene.remove_object(a).unwrap();
        let b = scene.add_object("b", TriangleMesh::unit_cube()).unwrap();

        assert_ne!(a, b);
        assert!(!scene.contains(a));
        assert!(matches!(scene.object(a), Err(Error::NotFound(_))));
        assert_eq!(scene.handles().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn test_mutations_bump_revision() {
        let mut scene = Scene::new();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        assert_eq!(scene.object(a).unwrap().revision(), 0);

        scene.translate(a, Vector3::new(1.0, 0.0, 0.0)).unwrap();
        scene.set_pose(a, Pose::identity()).unwrap();
        scene.set_mesh(a, TriangleMesh::plane(1.0)).unwrap();
        assert_eq!(scene.object(a).unwrap().revision(), 3);

        scene
            .enable_rigid_body(a, RigidBodySettings::active())
            .unwrap();
        assert_eq!(scene.object(a).unwrap().revision(), 3);
    }

    #[test]
    fn test_world_bounding_box() {
        let mut scene = Scene::new();
        let a = scene
            .add_object_with_transform(
                "a",
                TriangleMesh::unit_cube(),
                Transform3D::identity()
                    .with_location(Vector3::new(2.0, 0.0, 0.0))
                    .with_scale(Vector3::new(2.0, 1.0, 1.0)),
            )
            .unwrap();

        let corners = scene.bounding_box_corners(a).unwrap();
        assert_relative_eq!(corners[0], Point3::new(1.0, -0.5, -0.5));
        assert_relative_eq!(corners[7], Point3::new(3.0, 0.5, 0.5));
        assert_relative_eq!(
            scene.object(a).unwrap().bounding_box_center(),
            Point3::new(2.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_compound_parent_must_exist() {
        let mut scene = Scene::new();
        let a = scene.add_object("a", TriangleMesh::unit_cube()).unwrap();
        let missing = ObjectHandle::from_index(42);

        let result =
            scene.enable_rigid_body(a, RigidBodySettings::active().with_compound_parent(missing));
        assert_eq!(result, Err(Error::NotFound(missing)));

        let result =
            scene.enable_rigid_body(a, RigidBodySettings::active().with_compound_parent(a));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
