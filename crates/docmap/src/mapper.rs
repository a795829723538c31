//! Result mappers applied between records and stored documents.
//!
//! A [`Mapper`] rewrites the document form of a record on its way to the
//! store and on its way back. Repositories, batch writers and exporters apply
//! it to every document they write or read; reads are mapped in result
//! order and the first failure aborts the whole read.

use std::fmt::Debug;

use bson::{Bson, Document, doc};

use crate::error::MappingError;

/// Rewrites documents between their record shape and their stored shape.
pub trait Mapper: Send + Sync + Debug {
    /// Rewrites a record-shaped document before it is written.
    fn to_store(&self, doc: Document) -> Result<Document, MappingError>;

    /// Rewrites a stored document before it is decoded into a record.
    fn from_store(&self, doc: Document) -> Result<Document, MappingError>;
}

/// Stores a latitude/longitude pair as a GeoJSON point.
///
/// On write, a document carrying both coordinates as numbers gets a
/// `{ type: "Point", coordinates: [latitude, longitude] }` field and loses
/// the two plain fields. On read, the point is unfolded again.
///
/// ```
/// use bson::doc;
/// use docmap::mapper::{Mapper, PointMapper};
///
/// let mapper = PointMapper::default();
/// let stored = mapper
///     .to_store(doc! { "name": "depot", "latitude": 21.0, "longitude": 105.8 })
///     .unwrap();
/// assert_eq!(
///     stored,
///     doc! { "name": "depot", "location": { "type": "Point", "coordinates": [21.0, 105.8] } }
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointMapper {
    point_key: String,
    latitude_key: String,
    longitude_key: String,
}

impl Default for PointMapper {
    fn default() -> Self {
        Self::new("location", "latitude", "longitude")
    }
}

impl PointMapper {
    /// Creates a mapper over the given storage keys.
    pub fn new(
        point_key: impl Into<String>,
        latitude_key: impl Into<String>,
        longitude_key: impl Into<String>,
    ) -> Self {
        Self {
            point_key: point_key.into(),
            latitude_key: latitude_key.into(),
            longitude_key: longitude_key.into(),
        }
    }
}

fn coordinate(value: Option<&Bson>) -> Option<f64> {
    match value? {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

impl Mapper for PointMapper {
    fn to_store(&self, mut doc: Document) -> Result<Document, MappingError> {
        let latitude = coordinate(doc.get(&self.latitude_key));
        let longitude = coordinate(doc.get(&self.longitude_key));
        if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
            doc.remove(&self.latitude_key);
            doc.remove(&self.longitude_key);
            doc.insert(
                self.point_key.clone(),
                doc! { "type": "Point", "coordinates": [latitude, longitude] },
            );
        }
        Ok(doc)
    }

    fn from_store(&self, mut doc: Document) -> Result<Document, MappingError> {
        let Some(Bson::Document(point)) = doc.get(&self.point_key) else {
            return Ok(doc);
        };
        let coordinates = match point.get("coordinates") {
            Some(Bson::Array(values)) if values.len() == 2 => {
                coordinate(values.first()).zip(coordinate(values.get(1)))
            }
            _ => None,
        };
        let Some((latitude, longitude)) = coordinates else {
            return Err(MappingError::Mapper {
                message: format!("'{}' is not a [latitude, longitude] point", self.point_key),
            });
        };
        doc.remove(&self.point_key);
        doc.insert(self.latitude_key.clone(), latitude);
        doc.insert(self.longitude_key.clone(), longitude);
        Ok(doc)
    }
}

/// Applies an optional mapper to every document, failing fast.
pub(crate) fn map_from_store(
    mapper: Option<&dyn Mapper>,
    docs: Vec<Document>,
) -> Result<Vec<Document>, MappingError> {
    match mapper {
        None => Ok(docs),
        Some(mapper) => docs.into_iter().map(|doc| mapper.from_store(doc)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_point() {
        let mapper = PointMapper::new("geo", "lat", "lng");
        let stored = mapper
            .to_store(doc! { "_id": "s1", "lat": 10.5, "lng": 106 })
            .unwrap();
        assert_eq!(
            stored.get_document("geo").unwrap(),
            &doc! { "type": "Point", "coordinates": [10.5, 106.0] }
        );
        assert!(!stored.contains_key("lat"));

        let restored = mapper.from_store(stored).unwrap();
        assert_eq!(restored, doc! { "_id": "s1", "lat": 10.5, "lng": 106.0 });
    }

    #[test]
    fn test_missing_coordinates_leave_document_alone() {
        let mapper = PointMapper::default();
        let doc = doc! { "latitude": 1.0, "name": "x" };
        assert_eq!(mapper.to_store(doc.clone()).unwrap(), doc);
        assert_eq!(mapper.from_store(doc.clone()).unwrap(), doc);
    }

    #[test]
    fn test_malformed_point_is_an_error() {
        let mapper = PointMapper::default();
        let err = mapper
            .from_store(doc! { "location": { "type": "Point", "coordinates": ["a"] } })
            .unwrap_err();
        assert!(matches!(err, MappingError::Mapper { .. }));
    }

    #[test]
    fn test_map_from_store_fails_fast() {
        let mapper = PointMapper::default();
        let docs = vec![
            doc! { "location": { "coordinates": [1.0, 2.0] } },
            doc! { "location": { "coordinates": [] } },
        ];
        assert!(map_from_store(Some(&mapper), docs).is_err());
        assert_eq!(map_from_store(None, vec![doc! {}]).unwrap().len(), 1);
    }
}
