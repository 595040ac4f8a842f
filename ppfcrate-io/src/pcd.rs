//! PCD (Point Cloud Data) format support
//!
//! Reads ASCII and binary PCD files with arbitrary scalar fields and writes
//! oriented clouds with the `x y z normal_x normal_y normal_z` layout.

use crate::error::{create_file, open_file, IoError};
use crate::{OrientedCloudReader, OrientedCloudWriter, PointCloudReader, PointCloudWriter};
use ppfcrate_core::{NormalPoint3f, Point3f, PointCloud, Result, Vector3f};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// PCD data format variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdDataFormat {
    Ascii,
    Binary,
    BinaryCompressed,
}

/// PCD field data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdFieldType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PcdFieldType {
    fn from_header(type_char: &str, size: usize) -> Option<Self> {
        match (type_char, size) {
            ("I", 1) => Some(PcdFieldType::I8),
            ("I", 2) => Some(PcdFieldType::I16),
            ("I", 4) => Some(PcdFieldType::I32),
            ("U", 1) => Some(PcdFieldType::U8),
            ("U", 2) => Some(PcdFieldType::U16),
            ("U", 4) => Some(PcdFieldType::U32),
            ("F", 4) => Some(PcdFieldType::F32),
            ("F", 8) => Some(PcdFieldType::F64),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            PcdFieldType::I8 | PcdFieldType::U8 => 1,
            PcdFieldType::I16 | PcdFieldType::U16 => 2,
            PcdFieldType::I32 | PcdFieldType::U32 | PcdFieldType::F32 => 4,
            PcdFieldType::F64 => 8,
        }
    }

    fn type_char(self) -> &'static str {
        match self {
            PcdFieldType::I8 | PcdFieldType::I16 | PcdFieldType::I32 => "I",
            PcdFieldType::U8 | PcdFieldType::U16 | PcdFieldType::U32 => "U",
            PcdFieldType::F32 | PcdFieldType::F64 => "F",
        }
    }

    /// Decode one little-endian value
    fn decode(self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        match self {
            PcdFieldType::I8 => buf[0] as i8 as f64,
            PcdFieldType::U8 => buf[0] as f64,
            PcdFieldType::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            PcdFieldType::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            PcdFieldType::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PcdFieldType::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PcdFieldType::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PcdFieldType::F64 => f64::from_le_bytes(buf),
        }
    }
}

/// PCD field definition
#[derive(Debug, Clone, PartialEq)]
pub struct PcdField {
    pub name: String,
    pub field_type: PcdFieldType,
    pub count: usize,
}

/// PCD header information
#[derive(Debug, Clone)]
pub struct PcdHeader {
    pub version: String,
    pub fields: Vec<PcdField>,
    pub width: usize,
    pub height: usize,
    pub viewpoint: [f64; 7], // tx, ty, tz, qw, qx, qy, qz
    pub data_format: PcdDataFormat,
}

impl PcdHeader {
    pub fn num_points(&self) -> usize {
        self.width * self.height
    }

    /// Number of scalar values stored per point
    pub fn values_per_point(&self) -> usize {
        self.fields.iter().map(|f| f.count).sum()
    }

    /// Offset of the first value of `name` within a point's value row
    pub fn field_offset(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.count;
        }
        None
    }
}

/// Decoded PCD contents: one row of values per point, in field order
#[derive(Debug, Clone)]
pub struct PcdData {
    pub header: PcdHeader,
    pub rows: Vec<Vec<f64>>,
}

impl PcdData {
    fn column3(&self, names: [&str; 3], path: &Path) -> Result<Vec<Vector3f>> {
        let offsets = names
            .iter()
            .map(|name| {
                self.header
                    .field_offset(name)
                    .ok_or_else(|| IoError::parse(path, format!("missing field '{}'", name)))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(self
            .rows
            .iter()
            .map(|row| Vector3f::new(row[offsets[0]] as f32, row[offsets[1]] as f32, row[offsets[2]] as f32))
            .collect())
    }
}

/// PCD write options
#[derive(Debug, Clone)]
pub struct PcdWriteOptions {
    pub data_format: PcdDataFormat,
    pub version: String,
    pub viewpoint: Option<[f64; 7]>,
}

impl Default for PcdWriteOptions {
    fn default() -> Self {
        Self {
            data_format: PcdDataFormat::Binary,
            version: "0.7".to_string(),
            viewpoint: None,
        }
    }
}

impl PcdWriteOptions {
    pub fn ascii() -> Self {
        Self {
            data_format: PcdDataFormat::Ascii,
            ..Default::default()
        }
    }
}

pub struct PcdReader;

impl PcdReader {
    /// Read a PCD file into its header and decoded rows
    pub fn read_pcd_file<P: AsRef<Path>>(path: P) -> Result<PcdData> {
        let path = path.as_ref();
        let mut reader = BufReader::new(open_file(path)?);
        Self::read_pcd_data(&mut reader).map_err(|message| IoError::parse(path, message).into())
    }

    /// Read PCD data from a reader
    pub fn read_pcd_data<R: BufRead>(reader: &mut R) -> std::result::Result<PcdData, String> {
        let header = Self::read_header(reader)?;
        let rows = match header.data_format {
            PcdDataFormat::Ascii => Self::read_ascii_rows(reader, &header)?,
            PcdDataFormat::Binary => Self::read_binary_rows(reader, &header)?,
            PcdDataFormat::BinaryCompressed => {
                return Err("binary_compressed PCD data is not supported".to_string())
            }
        };
        Ok(PcdData { header, rows })
    }

    fn read_header<R: BufRead>(reader: &mut R) -> std::result::Result<PcdHeader, String> {
        let mut version = None;
        let mut names: Vec<String> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        let mut types: Vec<String> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut width = None;
        let mut height = None;
        let mut viewpoint = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let mut points = None;

        let parse_list = |parts: &[&str], key: &str| -> std::result::Result<Vec<usize>, String> {
            parts
                .iter()
                .map(|s| s.parse::<usize>().map_err(|_| format!("invalid {} value: {}", key, s)))
                .collect()
        };
        let parse_one = |parts: &[&str], key: &str| -> std::result::Result<usize, String> {
            parts
                .first()
                .ok_or_else(|| format!("{} has no value", key))?
                .parse::<usize>()
                .map_err(|_| format!("invalid {} value", key))
        };

        let mut line = String::new();
        let data_format = loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).map_err(|e| e.to_string())?;
            if bytes_read == 0 {
                return Err("unexpected end of file in PCD header".to_string());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            let (key, values) = (parts[0], &parts[1..]);
            match key {
                "VERSION" => version = values.first().map(|v| v.to_string()),
                "FIELDS" => names = values.iter().map(|v| v.to_string()).collect(),
                "SIZE" => sizes = parse_list(values, "SIZE")?,
                "TYPE" => types = values.iter().map(|v| v.to_string()).collect(),
                "COUNT" => counts = parse_list(values, "COUNT")?,
                "WIDTH" => width = Some(parse_one(values, "WIDTH")?),
                "HEIGHT" => height = Some(parse_one(values, "HEIGHT")?),
                "POINTS" => points = Some(parse_one(values, "POINTS")?),
                "VIEWPOINT" => {
                    if values.len() != 7 {
                        return Err("VIEWPOINT needs 7 values".to_string());
                    }
                    for (slot, value) in viewpoint.iter_mut().zip(values) {
                        *slot = value
                            .parse::<f64>()
                            .map_err(|_| format!("invalid VIEWPOINT value: {}", value))?;
                    }
                }
                "DATA" => match values.first().copied() {
                    Some("ascii") => break PcdDataFormat::Ascii,
                    Some("binary") => break PcdDataFormat::Binary,
                    Some("binary_compressed") => break PcdDataFormat::BinaryCompressed,
                    other => return Err(format!("unknown DATA format: {:?}", other)),
                },
                // Ignore unknown header fields
                _ => {}
            }
        };

        let version = version.ok_or("missing VERSION in PCD header")?;
        let width = width.ok_or("missing WIDTH in PCD header")?;
        let height = height.ok_or("missing HEIGHT in PCD header")?;

        if counts.is_empty() {
            counts = vec![1; names.len()];
        }
        if names.is_empty() || sizes.len() != names.len() || types.len() != names.len() || counts.len() != names.len() {
            return Err("mismatch between FIELDS, SIZE, TYPE and COUNT declarations".to_string());
        }

        let fields = names
            .into_iter()
            .zip(types.iter().zip(sizes.iter().zip(&counts)))
            .map(|(name, (type_char, (&size, &count)))| -> std::result::Result<PcdField, String> {
                let field_type = PcdFieldType::from_header(type_char, size)
                    .ok_or_else(|| format!("unknown field type/size combination: {}/{}", type_char, size))?;
                Ok(PcdField { name, field_type, count })
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;

        if let Some(points) = points {
            if points != width * height {
                return Err(format!(
                    "POINTS ({}) doesn't match WIDTH * HEIGHT ({})",
                    points,
                    width * height
                ));
            }
        }

        Ok(PcdHeader {
            version,
            fields,
            width,
            height,
            viewpoint,
            data_format,
        })
    }

    fn read_ascii_rows<R: BufRead>(reader: &mut R, header: &PcdHeader) -> std::result::Result<Vec<Vec<f64>>, String> {
        let expected = header.values_per_point();
        let mut rows = Vec::with_capacity(header.num_points());

        for line in reader.lines() {
            let line = line.map_err(|e| e.to_string())?;
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|v| v.parse::<f64>().map_err(|_| format!("invalid value: {}", v)))
                .collect::<std::result::Result<Vec<f64>, String>>()?;
            if row.len() != expected {
                return Err(format!("expected {} values per point, found {}", expected, row.len()));
            }
            rows.push(row);
            if rows.len() == header.num_points() {
                break;
            }
        }

        if rows.len() != header.num_points() {
            return Err(format!("expected {} points, found {}", header.num_points(), rows.len()));
        }
        Ok(rows)
    }

    fn read_binary_rows<R: Read>(reader: &mut R, header: &PcdHeader) -> std::result::Result<Vec<Vec<f64>>, String> {
        let stride: usize = header.fields.iter().map(|f| f.field_type.size() * f.count).sum();
        let mut buf = vec![0u8; stride];
        let mut rows = Vec::with_capacity(header.num_points());

        for _ in 0..header.num_points() {
            reader
                .read_exact(&mut buf)
                .map_err(|e| format!("truncated binary data: {}", e))?;

            let mut row = Vec::with_capacity(header.values_per_point());
            let mut offset = 0;
            for field in &header.fields {
                let size = field.field_type.size();
                for _ in 0..field.count {
                    row.push(field.field_type.decode(&buf[offset..offset + size]));
                    offset += size;
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

impl PointCloudReader for PcdReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
        let path = path.as_ref();
        let data = Self::read_pcd_file(path)?;
        Ok(data
            .column3(["x", "y", "z"], path)?
            .into_iter()
            .map(Point3f::from)
            .collect())
    }
}

impl OrientedCloudReader for PcdReader {
    fn read_oriented_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<NormalPoint3f>> {
        let path = path.as_ref();
        let data = Self::read_pcd_file(path)?;
        let positions = data.column3(["x", "y", "z"], path)?;
        let normals = data.column3(["normal_x", "normal_y", "normal_z"], path)?;

        Ok(positions
            .into_iter()
            .zip(normals)
            .map(|(p, n)| NormalPoint3f::new(Point3f::from(p), n))
            .collect())
    }
}

pub struct PcdWriter;

impl PcdWriter {
    /// Write rows of `f32` values under the given field names
    fn write_rows(path: &Path, names: &[&str], rows: &[Vec<f32>], options: &PcdWriteOptions) -> Result<()> {
        let mut writer = BufWriter::new(create_file(path)?);
        Self::write_rows_to_writer(&mut writer, names, rows, options).map_err(|e| IoError::write(path, e))?;
        writer.flush().map_err(|e| IoError::write(path, e))?;
        Ok(())
    }

    fn write_rows_to_writer<W: Write>(
        writer: &mut W,
        names: &[&str],
        rows: &[Vec<f32>],
        options: &PcdWriteOptions,
    ) -> std::io::Result<()> {
        let field_type = PcdFieldType::F32;
        let viewpoint = options.viewpoint.unwrap_or([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let repeat = |value: &str| vec![value; names.len()].join(" ");

        writeln!(writer, "# .PCD v{} - Point Cloud Data file format", options.version)?;
        writeln!(writer, "VERSION {}", options.version)?;
        writeln!(writer, "FIELDS {}", names.join(" "))?;
        writeln!(writer, "SIZE {}", repeat(field_type.size().to_string().as_str()))?;
        writeln!(writer, "TYPE {}", repeat(field_type.type_char()))?;
        writeln!(writer, "COUNT {}", repeat("1"))?;
        writeln!(writer, "WIDTH {}", rows.len())?;
        writeln!(writer, "HEIGHT 1")?;
        writeln!(
            writer,
            "VIEWPOINT {} {} {} {} {} {} {}",
            viewpoint[0], viewpoint[1], viewpoint[2], viewpoint[3], viewpoint[4], viewpoint[5], viewpoint[6]
        )?;
        writeln!(writer, "POINTS {}", rows.len())?;

        match options.data_format {
            PcdDataFormat::Ascii => {
                writeln!(writer, "DATA ascii")?;
                for row in rows {
                    let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                    writeln!(writer, "{}", line.join(" "))?;
                }
            }
            PcdDataFormat::Binary => {
                writeln!(writer, "DATA binary")?;
                for value in rows.iter().flatten() {
                    writer.write_all(&value.to_le_bytes())?;
                }
            }
            PcdDataFormat::BinaryCompressed => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "binary_compressed PCD data is not supported",
                ))
            }
        }
        Ok(())
    }

    pub fn write_point_cloud_with_options<P: AsRef<Path>>(
        cloud: &PointCloud<Point3f>,
        path: P,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let rows: Vec<Vec<f32>> = cloud.iter().map(|p| vec![p.x, p.y, p.z]).collect();
        Self::write_rows(path.as_ref(), &["x", "y", "z"], &rows, options)
    }

    pub fn write_oriented_cloud_with_options<P: AsRef<Path>>(
        cloud: &PointCloud<NormalPoint3f>,
        path: P,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let rows: Vec<Vec<f32>> = cloud
            .iter()
            .map(|p| vec![p.position.x, p.position.y, p.position.z, p.normal.x, p.normal.y, p.normal.z])
            .collect();
        Self::write_rows(
            path.as_ref(),
            &["x", "y", "z", "normal_x", "normal_y", "normal_z"],
            &rows,
            options,
        )
    }
}

impl PointCloudWriter for PcdWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()> {
        Self::write_point_cloud_with_options(cloud, path, &PcdWriteOptions::default())
    }
}

impl OrientedCloudWriter for PcdWriter {
    fn write_oriented_cloud<P: AsRef<Path>>(cloud: &PointCloud<NormalPoint3f>, path: P) -> Result<()> {
        Self::write_oriented_cloud_with_options(cloud, path, &PcdWriteOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppfcrate_core::Error;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn oriented_cloud() -> PointCloud<NormalPoint3f> {
        (0..5)
            .map(|i| {
                NormalPoint3f::new(
                    Point3f::new(i as f32 * 0.1, -0.3, 1.0 / (i as f32 + 1.0)),
                    Vector3f::new(1.0, i as f32, 0.5).normalize(),
                )
            })
            .collect()
    }

    #[test]
    fn test_oriented_roundtrip_binary_and_ascii() {
        let dir = tempdir().unwrap();
        let cloud = oriented_cloud();

        for (name, options) in [("b.pcd", PcdWriteOptions::default()), ("a.pcd", PcdWriteOptions::ascii())] {
            let path = dir.path().join(name);
            PcdWriter::write_oriented_cloud_with_options(&cloud, &path, &options).unwrap();
            let loaded = PcdReader::read_oriented_cloud(&path).unwrap();
            assert_eq!(loaded, cloud, "format {:?}", options.data_format);
        }
    }

    #[test]
    fn test_header_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ref.pcd");
        PcdWriter::write_oriented_cloud(&oriented_cloud(), &path).unwrap();

        let data = PcdReader::read_pcd_file(&path).unwrap();
        assert_eq!(data.header.version, "0.7");
        assert_eq!(data.header.num_points(), 5);
        assert_eq!(data.header.data_format, PcdDataFormat::Binary);
        assert_eq!(data.header.field_offset("normal_y"), Some(4));
        assert_eq!(data.header.field_offset("rgb"), None);
    }

    #[test]
    fn test_ascii_with_mixed_types() {
        let content = "# comment\nVERSION 0.7\nFIELDS x y z label\nSIZE 4 4 8 2\nTYPE F F F U\nCOUNT 1 1 1 1\nWIDTH 2\nHEIGHT 1\nPOINTS 2\nDATA ascii\n1.0 2.0 3.0 7\n4 5 6 9\n";
        let data = PcdReader::read_pcd_data(&mut Cursor::new(content)).unwrap();
        assert_eq!(data.rows, vec![vec![1.0, 2.0, 3.0, 7.0], vec![4.0, 5.0, 6.0, 9.0]]);
        assert_eq!(data.header.fields[2].field_type, PcdFieldType::F64);
    }

    #[test]
    fn test_xyz_only_file_has_no_normals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xyz.pcd");
        let cloud = PointCloud::from_points(vec![Point3f::new(1.0, 2.0, 3.0)]);
        PcdWriter::write_point_cloud(&cloud, &path).unwrap();

        assert_eq!(PcdReader::read_point_cloud(&path).unwrap(), cloud);
        assert!(matches!(PcdReader::read_oriented_cloud(&path), Err(Error::Load(_))));
    }

    #[test]
    fn test_invalid_headers() {
        let cases = [
            "VERSION 0.7\nFIELDS x\nSIZE 4\nTYPE F\nWIDTH 1\nHEIGHT 1\n",
            "VERSION 0.7\nFIELDS x y\nSIZE 4\nTYPE F F\nWIDTH 1\nHEIGHT 1\nDATA ascii\n1 2\n",
            "VERSION 0.7\nFIELDS x\nSIZE 3\nTYPE F\nWIDTH 1\nHEIGHT 1\nDATA ascii\n1\n",
            "VERSION 0.7\nFIELDS x\nSIZE 4\nTYPE F\nWIDTH 2\nHEIGHT 1\nPOINTS 3\nDATA ascii\n1\n2\n",
            "VERSION 0.7\nFIELDS x\nSIZE 4\nTYPE F\nWIDTH 2\nHEIGHT 1\nDATA ascii\n1\n",
        ];
        for content in cases {
            assert!(PcdReader::read_pcd_data(&mut Cursor::new(content)).is_err(), "{}", content);
        }
    }

    #[test]
    fn test_truncated_binary() {
        let mut content = b"VERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nWIDTH 1\nHEIGHT 1\nDATA binary\n".to_vec();
        content.extend_from_slice(&1.0f32.to_le_bytes());
        assert!(PcdReader::read_pcd_data(&mut Cursor::new(content)).is_err());
    }
}
