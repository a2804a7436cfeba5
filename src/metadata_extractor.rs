use exif::{In, Reader, Tag, Value};
use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Normalized record pulled out of an image's EXIF block. Latitude and
/// longitude are either both present or both absent; a partial GPS pair is
/// discarded.
#[derive(Debug, Default)]
pub struct PhotoMetadata {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date_taken: Option<String>,
    pub device_make: Option<String>,
    pub device_model: Option<String>,
    pub orientation: Option<u16>,
}

pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Clean EXIF string values by removing null bytes, trimming whitespace,
    /// and handling arrays with empty trailing values
    fn clean_exif_string(value: String) -> String {
        value
            .replace('\0', "")
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"')
            .trim()
            .to_string()
    }

    pub fn extract(path: &Path) -> PhotoMetadata {
        let mut metadata = PhotoMetadata::default();

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                debug!("Failed to open {} for EXIF read: {}", path.display(), e);
                return metadata;
            }
        };

        let mut reader = BufReader::new(file);
        match Reader::new().read_from_container(&mut reader) {
            Ok(exif_reader) => {
                Self::extract_capture_info(&exif_reader, &mut metadata);
                Self::extract_gps_info(&exif_reader, &mut metadata);
            }
            Err(e) => {
                debug!("Failed to read EXIF data for {}: {}", path.display(), e);
            }
        }

        metadata
    }

    fn extract_capture_info(reader: &exif::Exif, metadata: &mut PhotoMetadata) {
        if let Some(field) = reader.get_field(Tag::DateTimeOriginal, In::PRIMARY) {
            let value = Self::clean_exif_string(field.display_value().to_string());
            if !value.is_empty() {
                metadata.date_taken = Some(value);
            }
        }

        if let Some(field) = reader.get_field(Tag::Make, In::PRIMARY) {
            let value = Self::clean_exif_string(field.display_value().to_string());
            if !value.is_empty() {
                metadata.device_make = Some(value);
            }
        }

        if let Some(field) = reader.get_field(Tag::Model, In::PRIMARY) {
            let value = Self::clean_exif_string(field.display_value().to_string());
            if !value.is_empty() {
                metadata.device_model = Some(value);
            }
        }

        if let Some(field) = reader.get_field(Tag::Orientation, In::PRIMARY) {
            if let Value::Short(ref v) = field.value {
                if !v.is_empty() {
                    metadata.orientation = Some(v[0]);
                }
            }
        }
    }

    /// Populates the GPS pair only when both latitude and longitude decode
    /// fully; a lone hemisphere of data is treated as no location at all.
    fn extract_gps_info(reader: &exif::Exif, metadata: &mut PhotoMetadata) {
        let latitude = Self::decode_coordinate(reader, Tag::GPSLatitude, Tag::GPSLatitudeRef);
        let longitude = Self::decode_coordinate(reader, Tag::GPSLongitude, Tag::GPSLongitudeRef);

        if let (Some(lat), Some(lon)) = (latitude, longitude) {
            metadata.latitude = Some(lat);
            metadata.longitude = Some(lon);
        }
    }

    fn decode_coordinate(reader: &exif::Exif, tag: Tag, ref_tag: Tag) -> Option<f64> {
        let field = reader.get_field(tag, In::PRIMARY)?;
        let ref_field = reader.get_field(ref_tag, In::PRIMARY)?;
        let reference = ref_field.display_value().to_string();

        let components = Self::value_components(&field.value);
        Self::dms_to_decimal(&components, &reference)
    }

    /// Flattens an EXIF value into plain numbers. GPS coordinates arrive
    /// either as rationals or as plain numeric arrays depending on the writer.
    fn value_components(value: &Value) -> Vec<f64> {
        match value {
            Value::Rational(v) => v.iter().map(|r| r.to_f64()).collect(),
            Value::SRational(v) => v.iter().map(|r| r.to_f64()).collect(),
            Value::Byte(v) => v.iter().map(|&n| n as f64).collect(),
            Value::Short(v) => v.iter().map(|&n| n as f64).collect(),
            Value::Long(v) => v.iter().map(|&n| n as f64).collect(),
            Value::SShort(v) => v.iter().map(|&n| n as f64).collect(),
            Value::SLong(v) => v.iter().map(|&n| n as f64).collect(),
            Value::Float(v) => v.iter().map(|&n| n as f64).collect(),
            Value::Double(v) => v.clone(),
            _ => Vec::new(),
        }
    }

    /// `decimal = degrees + minutes/60 + seconds/3600`, negated for the
    /// southern and western hemispheres.
    fn dms_to_decimal(components: &[f64], reference: &str) -> Option<f64> {
        if components.len() != 3 {
            return None;
        }

        let decimal = components[0] + components[1] / 60.0 + components[2] / 3600.0;
        if reference.contains('S') || reference.contains('W') {
            Some(-decimal)
        } else {
            Some(decimal)
        }
    }
}
