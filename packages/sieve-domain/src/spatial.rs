use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result, query::EngineQuery};

const MIN_POLYGON_POINTS: usize = 3;
const MIN_CLOSED_POLYGON_POINTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
	pub latitude: f64,
	pub longitude: f64,
}
impl Point {
	fn validate(&self, path: &str) -> Result<()> {
		if !(-90.0..=90.0).contains(&self.latitude) {
			return Err(Error::bad_request(format!("{path}.latitude must be within [-90, 90].")));
		}
		if !(-180.0..=180.0).contains(&self.longitude) {
			return Err(Error::bad_request(format!(
				"{path}.longitude must be within [-180, 180]."
			)));
		}

		Ok(())
	}

	fn lat_lon(&self) -> Value {
		serde_json::json!({ "lat": self.latitude, "lon": self.longitude })
	}

	fn lon_lat(&self) -> Value {
		serde_json::json!([self.longitude, self.latitude])
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
	pub points: Vec<Point>,
}

/// Geo constraint attached to a search request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilter {
	pub field: String,
	#[serde(flatten)]
	pub shape: SpatialShape,
}
impl SpatialFilter {
	pub fn to_query(&self) -> Result<EngineQuery> {
		if self.field.trim().is_empty() {
			return Err(Error::bad_request("spatial_filter.field must be non-empty."));
		}

		let field = self.field.clone();
		let geo = match &self.shape {
			SpatialShape::ByBoundingBox { top_left, bottom_right } => {
				top_left.validate("spatial_filter.by_bounding_box.top_left")?;
				bottom_right.validate("spatial_filter.by_bounding_box.bottom_right")?;

				if top_left.latitude < bottom_right.latitude {
					return Err(Error::bad_request(
						"spatial_filter.by_bounding_box top latitude must not be below bottom latitude.",
					));
				}

				GeoQuery::BoundingBox { field, top_left: *top_left, bottom_right: *bottom_right }
			},
			SpatialShape::ByDistance { point, distance } => {
				point.validate("spatial_filter.by_distance.point")?;

				if !(*distance > 0.0) {
					return Err(Error::bad_request(
						"spatial_filter.by_distance.distance must be greater than zero.",
					));
				}

				GeoQuery::Distance { field, point: *point, distance_meters: *distance }
			},
			SpatialShape::ByGeoPolygon { points } => {
				if points.len() < MIN_POLYGON_POINTS {
					return Err(Error::bad_request(format!(
						"Polygons must have at least {MIN_POLYGON_POINTS} points"
					)));
				}

				for (idx, point) in points.iter().enumerate() {
					point.validate(&format!("spatial_filter.by_geo_polygon.points[{idx}]"))?;
				}

				GeoQuery::Polygon { field, points: points.clone() }
			},
			SpatialShape::ByIntersection { polygons } => {
				if polygons.is_empty() {
					return Err(Error::bad_request(
						"spatial_filter.by_intersection.polygons must be non-empty.",
					));
				}

				for polygon in polygons {
					validate_closed_polygon(&polygon.points)?;
				}

				GeoQuery::Intersection {
					field,
					polygons: polygons.iter().map(|polygon| polygon.points.clone()).collect(),
				}
			},
		};

		Ok(EngineQuery::Geo(geo))
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialShape {
	ByBoundingBox { top_left: Point, bottom_right: Point },
	/// `distance` is in meters.
	ByDistance { point: Point, distance: f64 },
	ByGeoPolygon { points: Vec<Point> },
	ByIntersection { polygons: Vec<Polygon> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum GeoQuery {
	BoundingBox { field: String, top_left: Point, bottom_right: Point },
	Distance { field: String, point: Point, distance_meters: f64 },
	Polygon { field: String, points: Vec<Point> },
	Intersection { field: String, polygons: Vec<Vec<Point>> },
}
impl GeoQuery {
	pub fn to_value(&self) -> Value {
		let (kind, mut body) = match self {
			Self::BoundingBox { field, top_left, bottom_right } => (
				"geo_bounding_box",
				single(
					field,
					serde_json::json!({
						"top_left": top_left.lat_lon(),
						"bottom_right": bottom_right.lat_lon(),
					}),
				),
			),
			Self::Distance { field, point, distance_meters } => {
				let mut body = single(field, point.lat_lon());

				body.insert("distance".to_string(), Value::from(format!("{distance_meters}m")));

				("geo_distance", body)
			},
			Self::Polygon { field, points } => (
				"geo_polygon",
				single(
					field,
					serde_json::json!({
						"points": points.iter().map(Point::lat_lon).collect::<Vec<_>>(),
					}),
				),
			),
			Self::Intersection { field, polygons } => {
				let geometries: Vec<Value> = polygons
					.iter()
					.map(|points| {
						serde_json::json!({
							"type": "polygon",
							"coordinates": [points.iter().map(Point::lon_lat).collect::<Vec<_>>()],
						})
					})
					.collect();

				(
					"geo_shape",
					single(
						field,
						serde_json::json!({
							"shape": { "type": "geometrycollection", "geometries": geometries },
							"relation": "intersects",
						}),
					),
				)
			},
		};

		body.insert("ignore_unmapped".to_string(), Value::Bool(true));

		let mut root = Map::new();

		root.insert(kind.to_string(), Value::Object(body));

		Value::Object(root)
	}
}

fn single(field: &str, value: Value) -> Map<String, Value> {
	let mut map = Map::new();

	map.insert(field.to_string(), value);

	map
}

fn validate_closed_polygon(points: &[Point]) -> Result<()> {
	if points.len() < MIN_CLOSED_POLYGON_POINTS {
		return Err(Error::bad_request(format!(
			"Polygons must have at least {MIN_CLOSED_POLYGON_POINTS} points"
		)));
	}
	if points.first() != points.last() {
		return Err(Error::bad_request(
			"The first point must match the last point to close the polygon",
		));
	}

	for (idx, point) in points.iter().enumerate() {
		point.validate(&format!("spatial_filter.by_intersection.points[{idx}]"))?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn point(latitude: f64, longitude: f64) -> Point {
		Point { latitude, longitude }
	}

	#[test]
	fn deserializes_shape_next_to_field() {
		let filter: SpatialFilter = serde_json::from_value(serde_json::json!({
			"field": "data.Location",
			"by_distance": { "point": { "latitude": 10.0, "longitude": 20.0 }, "distance": 1500.0 }
		}))
		.expect("Spatial filter must deserialize.");
		let value = filter.to_query().expect("Spatial filter must compile.").to_value();

		assert_eq!(value["geo_distance"]["distance"], "1500m");
		assert_eq!(value["geo_distance"]["data.Location"]["lat"], 10.0);
		assert_eq!(value["geo_distance"]["ignore_unmapped"], Value::Bool(true));
	}

	#[test]
	fn bounding_box_rejects_inverted_corners() {
		let filter = SpatialFilter {
			field: "data.Location".to_string(),
			shape: SpatialShape::ByBoundingBox {
				top_left: point(-10.0, 0.0),
				bottom_right: point(10.0, 5.0),
			},
		};
		let err = filter.to_query().expect_err("Expected inverted box error.");

		assert!(err.to_string().contains("top latitude must not be below bottom latitude"));
	}

	#[test]
	fn intersection_requires_closed_polygons() {
		let open = Polygon {
			points: vec![point(0.0, 0.0), point(0.0, 1.0), point(1.0, 1.0), point(1.0, 0.0)],
		};
		let filter = SpatialFilter {
			field: "data.Shape".to_string(),
			shape: SpatialShape::ByIntersection { polygons: vec![open] },
		};
		let err = filter.to_query().expect_err("Expected open polygon error.");

		assert_eq!(
			err,
			Error::bad_request("The first point must match the last point to close the polygon")
		);

		let short = Polygon { points: vec![point(0.0, 0.0), point(0.0, 1.0), point(0.0, 0.0)] };
		let filter = SpatialFilter {
			field: "data.Shape".to_string(),
			shape: SpatialShape::ByIntersection { polygons: vec![short] },
		};

		assert_eq!(
			filter.to_query().expect_err("Expected short polygon error."),
			Error::bad_request("Polygons must have at least 4 points")
		);
	}

	#[test]
	fn intersection_renders_lon_lat_geometry_collection() {
		let closed = Polygon {
			points: vec![point(0.0, 0.0), point(0.0, 1.0), point(1.0, 1.0), point(0.0, 0.0)],
		};
		let filter = SpatialFilter {
			field: "data.Shape".to_string(),
			shape: SpatialShape::ByIntersection { polygons: vec![closed] },
		};
		let value = filter.to_query().expect("Polygon must compile.").to_value();
		let shape = &value["geo_shape"]["data.Shape"]["shape"];

		assert_eq!(shape["type"], "geometrycollection");
		assert_eq!(shape["geometries"][0]["coordinates"][0][1], serde_json::json!([1.0, 0.0]));
	}
}
