//! PLY format support

use crate::error::{create_file, open_file, IoError};
use crate::{OrientedCloudReader, OrientedCloudWriter, PointCloudReader, PointCloudWriter};
use ply_rs::{
    parser::Parser,
    ply::{Addable, DefaultElement, ElementDef, Ply, Property, PropertyDef, PropertyType, ScalarType},
    writer::Writer,
};
use ppfcrate_core::{NormalPoint3f, Point3f, PointCloud, Result, Vector3f};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub struct PlyReader;
pub struct PlyWriter;

impl PlyReader {
    fn read_vertices(path: &Path) -> Result<Vec<DefaultElement>> {
        let mut reader = BufReader::new(open_file(path)?);
        let parser = Parser::<DefaultElement>::new();
        let mut ply = parser
            .read_ply(&mut reader)
            .map_err(|e| IoError::parse(path, e))?;

        ply.payload
            .remove("vertex")
            .ok_or_else(|| IoError::parse(path, "no vertex element").into())
    }
}

impl PointCloudReader for PlyReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
        let path = path.as_ref();
        let vertices = Self::read_vertices(path)?;

        let points = vertices
            .iter()
            .map(|vertex| read_xyz(vertex, ["x", "y", "z"], path).map(Point3f::from))
            .collect::<Result<Vec<_>>>()?;

        log::debug!("read {} points from {}", points.len(), path.display());
        Ok(PointCloud::from_points(points))
    }
}

impl OrientedCloudReader for PlyReader {
    fn read_oriented_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<NormalPoint3f>> {
        let path = path.as_ref();
        let vertices = Self::read_vertices(path)?;

        vertices
            .iter()
            .map(|vertex| {
                let position = read_xyz(vertex, ["x", "y", "z"], path)?;
                let normal = read_xyz(vertex, ["nx", "ny", "nz"], path)?;
                Ok(NormalPoint3f::new(Point3f::from(position), normal))
            })
            .collect()
    }
}

impl PointCloudWriter for PlyWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()> {
        let vertices = cloud
            .iter()
            .map(|point| vertex_element(&[("x", point.x), ("y", point.y), ("z", point.z)]))
            .collect();
        write_vertices(path.as_ref(), &["x", "y", "z"], vertices)
    }
}

impl OrientedCloudWriter for PlyWriter {
    fn write_oriented_cloud<P: AsRef<Path>>(cloud: &PointCloud<NormalPoint3f>, path: P) -> Result<()> {
        let vertices = cloud
            .iter()
            .map(|p| {
                vertex_element(&[
                    ("x", p.position.x),
                    ("y", p.position.y),
                    ("z", p.position.z),
                    ("nx", p.normal.x),
                    ("ny", p.normal.y),
                    ("nz", p.normal.z),
                ])
            })
            .collect();
        write_vertices(path.as_ref(), &["x", "y", "z", "nx", "ny", "nz"], vertices)
    }
}

fn vertex_element(values: &[(&str, f32)]) -> DefaultElement {
    let mut vertex = DefaultElement::new();
    for &(name, value) in values {
        vertex.insert(name.to_string(), Property::Float(value));
    }
    vertex
}

fn write_vertices(path: &Path, properties: &[&str], vertices: Vec<DefaultElement>) -> Result<()> {
    let mut ply = Ply::<DefaultElement>::new();

    let mut vertex_element = ElementDef::new("vertex".to_string());
    vertex_element.count = vertices.len();
    for name in properties {
        vertex_element.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    ply.header.elements.add(vertex_element);
    ply.payload.insert("vertex".to_string(), vertices);

    let mut writer = BufWriter::new(create_file(path)?);
    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .map_err(|e| IoError::write(path, e))?;
    writer.flush().map_err(|e| IoError::write(path, e))?;
    Ok(())
}

/// Read three scalar properties of a PLY element as a vector
fn read_xyz(element: &DefaultElement, names: [&str; 3], path: &Path) -> Result<Vector3f> {
    let mut values = [0.0f32; 3];
    for (value, name) in values.iter_mut().zip(names) {
        *value = extract_property_value(element, name)
            .ok_or_else(|| IoError::parse(path, format!("property '{}' missing or not numeric", name)))?;
    }
    Ok(Vector3f::new(values[0], values[1], values[2]))
}

/// Extract a property value as f32 from a PLY element
fn extract_property_value(element: &DefaultElement, name: &str) -> Option<f32> {
    match element.get(name)? {
        Property::Float(val) => Some(*val),
        Property::Double(val) => Some(*val as f32),
        Property::Int(val) => Some(*val as f32),
        Property::UInt(val) => Some(*val as f32),
        Property::Short(val) => Some(*val as f32),
        Property::UShort(val) => Some(*val as f32),
        _ => None,
    }
}
