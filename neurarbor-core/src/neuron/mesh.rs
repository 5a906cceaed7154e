//! Surface neurons backed by vertex and face arrays.

use super::base::{NeuronCore, NeuronId};
use crate::error::{Error, Result};
use crate::nodes::{min_max, ConnectorTable};
use crate::units::Quantity;
use crate::value::Value;
use log::debug;
use ndarray::{Array2, ArrayD, Ix2};
use std::collections::HashMap;
use std::ops::{Div, Mul};
use std::sync::{Arc, OnceLock};

/// Triangulated-mesh helper with geometric queries.
///
/// Faces with more than three corners are fan-triangulated.
#[derive(Debug, Clone, PartialEq)]
pub struct TriMesh {
    vertices: Array2<f64>,
    triangles: Vec<[usize; 3]>,
    /// Undirected edge → number of adjacent triangles.
    edge_faces: HashMap<[usize; 2], usize>,
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

impl TriMesh {
    #[must_use]
    pub fn new(vertices: &Array2<f64>, faces: &Array2<usize>) -> Self {
        let mut triangles = Vec::with_capacity(faces.nrows());
        for face in faces.rows() {
            for k in 1..face.len().saturating_sub(1) {
                triangles.push([face[0], face[k], face[k + 1]]);
            }
        }
        let mut edge_faces: HashMap<[usize; 2], usize> = HashMap::new();
        for t in &triangles {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                *edge_faces.entry([a.min(b), a.max(b)]).or_default() += 1;
            }
        }
        Self {
            vertices: vertices.clone(),
            triangles,
            edge_faces,
        }
    }

    fn vertex(&self, i: usize) -> [f64; 3] {
        [self.vertices[[i, 0]], self.vertices[[i, 1]], self.vertices[[i, 2]]]
    }

    fn corners(&self, t: &[usize; 3]) -> [[f64; 3]; 3] {
        [self.vertex(t[0]), self.vertex(t[1]), self.vertex(t[2])]
    }

    fn triangle_area(&self, t: &[usize; 3]) -> f64 {
        let [a, b, c] = self.corners(t);
        let n = cross(sub(b, a), sub(c, a));
        dot(n, n).sqrt() / 2.0
    }

    /// Surface area.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.triangles.iter().map(|t| self.triangle_area(t)).sum()
    }

    /// Enclosed volume; only meaningful for watertight meshes.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                let [a, b, c] = self.corners(t);
                dot(a, cross(b, c))
            })
            .sum::<f64>()
            .abs()
            / 6.0
    }

    /// Area-weighted surface centroid, falling back to the vertex mean.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn centroid(&self) -> [f64; 3] {
        let mut acc = [0.0; 3];
        let mut total = 0.0;
        for t in &self.triangles {
            let w = self.triangle_area(t);
            let [a, b, c] = self.corners(t);
            for i in 0..3 {
                acc[i] += w * (a[i] + b[i] + c[i]) / 3.0;
            }
            total += w;
        }
        if total > 0.0 {
            return acc.map(|v| v / total);
        }
        let n = self.vertices.nrows();
        if n == 0 {
            return [f64::NAN; 3];
        }
        let mut mean = [0.0; 3];
        for i in 0..n {
            let v = self.vertex(i);
            for k in 0..3 {
                mean[k] += v[k] / n as f64;
            }
        }
        mean
    }

    /// Unique undirected edges as `(n, 2)` sorted vertex pairs.
    #[must_use]
    pub fn edges(&self) -> Array2<usize> {
        let mut edges: Vec<[usize; 2]> = self.edge_faces.keys().copied().collect();
        edges.sort_unstable();
        let mut out = Array2::zeros((edges.len(), 2));
        for (i, e) in edges.iter().enumerate() {
            out[[i, 0]] = e[0];
            out[[i, 1]] = e[1];
        }
        out
    }

    /// `V - E + F`; 2 for a closed genus-0 surface.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn euler_number(&self) -> i64 {
        self.vertices.nrows() as i64 - self.edge_faces.len() as i64 + self.triangles.len() as i64
    }

    /// Every edge is shared by exactly two triangles.
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        !self.edge_faces.is_empty() && self.edge_faces.values().all(|n| *n == 2)
    }

    /// `[[xmin, xmax], [ymin, ymax], [zmin, zmax]]`.
    #[must_use]
    pub fn bounds(&self) -> Option<[[f64; 2]; 3]> {
        if self.vertices.nrows() == 0 {
            return None;
        }
        let col = |k: usize| min_max(&self.vertices.column(k).to_vec());
        Some([col(0), col(1), col(2)])
    }

    /// Named geometric query, used by attribute fallback.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<Value> {
        let value = match name {
            "area" => Value::Float(self.area()),
            "volume" => Value::Float(self.volume()),
            "centroid" => Value::List(self.centroid().iter().map(|v| Value::Float(*v)).collect()),
            "edges" => Value::IndexArray(self.edges()),
            "euler_number" => Value::Int(self.euler_number()),
            "is_watertight" => Value::Bool(self.is_watertight()),
            "bounds" => self.bounds().map_or(Value::None, Value::from),
            _ => return None,
        };
        Some(value)
    }
}

/// A neuron represented as a surface mesh.
#[derive(Debug, Clone)]
pub struct MeshNeuron {
    pub(crate) core: NeuronCore,
    vertices: Array2<f64>,
    faces: Array2<usize>,
    trimesh: OnceLock<Arc<TriMesh>>,
    generation: u64,
}

fn check_vertices(vertices: &Array2<f64>) -> Result<()> {
    if vertices.ncols() != 3 && vertices.nrows() > 0 {
        return Err(Error::Validation(format!(
            "vertices must have 3 columns, got {}",
            vertices.ncols()
        )));
    }
    Ok(())
}

fn check_faces(faces: &Array2<usize>, n_vertices: usize) -> Result<()> {
    if faces.nrows() > 0 && faces.ncols() < 3 {
        return Err(Error::Validation(format!(
            "faces need at least 3 corners, got {}",
            faces.ncols()
        )));
    }
    if let Some(bad) = faces.iter().find(|i| **i >= n_vertices) {
        return Err(Error::Validation(format!(
            "face references vertex {bad}, mesh has {n_vertices} vertices"
        )));
    }
    Ok(())
}

fn to_2d<T>(array: ArrayD<T>, what: &str) -> Result<Array2<T>> {
    let ndim = array.ndim();
    array
        .into_dimensionality::<Ix2>()
        .map_err(|_| Error::Validation(format!("{what} must be 2-D, got {ndim} dimension(s)")))
}

impl MeshNeuron {
    /// Creates a mesh neuron from `(n, 3)` vertices and `(m, k)` faces.
    pub fn new(vertices: Array2<f64>, faces: Array2<usize>) -> Result<Self> {
        check_vertices(&vertices)?;
        check_faces(&faces, vertices.nrows())?;
        Ok(Self {
            core: NeuronCore::default(),
            vertices,
            faces,
            trimesh: OnceLock::new(),
            generation: 0,
        })
    }

    /// Creates a mesh neuron from arrays of unchecked dimensionality.
    pub fn from_arrays(vertices: ArrayD<f64>, faces: ArrayD<usize>) -> Result<Self> {
        Self::new(to_2d(vertices, "vertices")?, to_2d(faces, "faces")?)
    }

    pub fn with_units(mut self, units: &str) -> Result<Self> {
        self.core.set_units(Some(units))?;
        Ok(self)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.core.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<NeuronId>) -> Self {
        self.core.id = id.into();
        self
    }

    #[must_use]
    pub fn with_connectors(mut self, connectors: ConnectorTable) -> Self {
        self.core.set_connectors(Some(connectors));
        self
    }

    #[must_use]
    pub fn core(&self) -> &NeuronCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut NeuronCore {
        &mut self.core
    }

    #[must_use]
    pub fn id(&self) -> &NeuronId {
        &self.core.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.core.name()
    }

    #[must_use]
    pub fn units(&self) -> Quantity {
        self.core.units()
    }

    #[must_use]
    pub fn vertices(&self) -> &Array2<f64> {
        &self.vertices
    }

    #[must_use]
    pub fn faces(&self) -> &Array2<usize> {
        &self.faces
    }

    /// Replaces vertices; existing faces must still be valid.
    pub fn set_vertices(&mut self, vertices: ArrayD<f64>) -> Result<()> {
        let vertices = to_2d(vertices, "vertices")?;
        check_vertices(&vertices)?;
        check_faces(&self.faces, vertices.nrows())?;
        self.vertices = vertices;
        self.clear_temp_attr();
        Ok(())
    }

    pub fn set_faces(&mut self, faces: ArrayD<usize>) -> Result<()> {
        let faces = to_2d(faces, "faces")?;
        check_faces(&faces, self.vertices.nrows())?;
        self.faces = faces;
        self.clear_temp_attr();
        Ok(())
    }

    #[must_use]
    pub fn n_vertices(&self) -> usize {
        self.vertices.nrows()
    }

    #[must_use]
    pub fn n_faces(&self) -> usize {
        self.faces.nrows()
    }

    #[must_use]
    pub fn connectors(&self) -> Option<&ConnectorTable> {
        self.core.connectors()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drops the cached mesh helper.
    pub fn clear_temp_attr(&mut self) {
        self.trimesh = OnceLock::new();
        self.generation += 1;
        debug!("neuron {}: temporary attributes cleared", self.id());
    }

    /// Mesh helper, built on first access.
    #[must_use]
    pub fn trimesh(&self) -> Arc<TriMesh> {
        Arc::clone(
            self.trimesh
                .get_or_init(|| Arc::new(TriMesh::new(&self.vertices, &self.faces))),
        )
    }

    #[must_use]
    pub fn bbox(&self) -> Option<[[f64; 2]; 3]> {
        self.trimesh().bounds()
    }

    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    fn rescale(&mut self, factor: f64, units: Quantity) {
        self.vertices *= factor;
        if self.core.has_connectors() {
            if let Some(c) = self.core.connectors_mut() {
                c.scale(factor);
            }
        }
        self.core.set_units_quantity(units.to_compact());
        self.clear_temp_attr();
    }

    /// Multiplies vertex and connector coordinates in place.
    pub fn scale(&mut self, factor: f64) {
        let units = self.units() * factor;
        self.rescale(factor, units);
    }

    pub fn divide(&mut self, divisor: f64) {
        let units = self.units() / divisor;
        self.rescale(1.0 / divisor, units);
    }

    /// Converts coordinates to another unit. Fails for dimensionless meshes.
    pub fn convert_units(&mut self, to: &str) -> Result<()> {
        let current = self.units();
        if current.is_dimensionless() {
            return Err(Error::Units(
                "unable to convert: neuron has no units set".to_string(),
            ));
        }
        let target = Quantity::new(1.0, Quantity::parse(to)?.unit);
        let factor = current.factor_to(&target)?;
        self.rescale(factor, target);
        Ok(())
    }
}

impl Mul<f64> for &MeshNeuron {
    type Output = MeshNeuron;

    fn mul(self, rhs: f64) -> MeshNeuron {
        let mut n = self.copy();
        n.scale(rhs);
        n
    }
}

impl Div<f64> for &MeshNeuron {
    type Output = MeshNeuron;

    fn div(self, rhs: f64) -> MeshNeuron {
        let mut n = self.copy();
        n.divide(rhs);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, IxDyn};

    fn cube() -> MeshNeuron {
        let vertices = array![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        let faces = array![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        MeshNeuron::new(vertices, faces).unwrap()
    }

    #[test]
    fn test_trimesh_queries() {
        let m = cube().trimesh();
        assert_relative_eq!(m.area(), 6.0);
        assert_relative_eq!(m.volume(), 1.0);
        let c = m.centroid();
        assert_relative_eq!(c[0], 0.5);
        assert_relative_eq!(c[2], 0.5);
        assert_eq!(m.edges().nrows(), 18);
        assert_eq!(m.euler_number(), 2);
        assert!(m.is_watertight());
        assert_eq!(m.bounds().unwrap()[1], [0.0, 1.0]);
        assert!(m.attr("nonsense").is_none());
    }

    #[test]
    fn test_open_mesh_not_watertight() {
        let m = MeshNeuron::new(
            array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            array![[0, 1, 2]],
        )
        .unwrap();
        assert!(!m.trimesh().is_watertight());
        assert_relative_eq!(m.trimesh().area(), 0.5);
    }

    #[test]
    fn test_arrays_must_be_2d() {
        let flat = ArrayD::<f64>::zeros(IxDyn(&[9]));
        let faces = ArrayD::<usize>::zeros(IxDyn(&[0, 3]));
        assert!(matches!(
            MeshNeuron::from_arrays(flat, faces.clone()),
            Err(Error::Validation(_))
        ));
        let mut m = cube();
        assert!(m.set_faces(ArrayD::<usize>::zeros(IxDyn(&[2, 3, 1]))).is_err());
        assert!(m.set_faces(faces).is_ok());
        assert_eq!(m.n_faces(), 0);
    }

    #[test]
    fn test_face_indices_checked() {
        let bad = MeshNeuron::new(array![[0.0, 0.0, 0.0]], array![[0, 1, 2]]);
        assert!(matches!(bad, Err(Error::Validation(_))));
    }

    #[test]
    fn test_assignment_invalidates_trimesh() {
        let mut m = cube();
        let before = m.trimesh();
        assert!(Arc::ptr_eq(&before, &m.trimesh()));
        let doubled = (m.vertices() * 2.0).into_dyn();
        m.set_vertices(doubled).unwrap();
        assert!(!Arc::ptr_eq(&before, &m.trimesh()));
        assert_relative_eq!(m.trimesh().volume(), 8.0);
    }

    #[test]
    fn test_scale_without_connectors() {
        let m = cube().with_units("nm").unwrap();
        let scaled = &m / 1000.0;
        assert!(scaled.connectors().is_none());
        assert_eq!(scaled.units().to_string(), "1 picometer");
        assert_relative_eq!(scaled.vertices()[[6, 0]], 0.001);
        let back = &scaled * 1000.0;
        assert_eq!(back.units(), m.units());
    }
}
