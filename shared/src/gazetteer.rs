use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

/// A named district centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl District {
    pub fn center(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Punjab district centroids (name, latitude, longitude).
const PUNJAB_DISTRICTS: [(&str, f64, f64); 36] = [
    ("Attock", 33.7667, 72.3667),
    ("Bahawalnagar", 29.9987, 73.2536),
    ("Bahawalpur", 29.3956, 71.6836),
    ("Bhakkar", 31.6333, 71.0667),
    ("Chakwal", 32.9328, 72.8630),
    ("Chiniot", 31.7200, 72.9789),
    ("Dera Ghazi Khan", 30.0459, 70.6403),
    ("Faisalabad", 31.4504, 73.1350),
    ("Gujranwala", 32.1877, 74.1945),
    ("Gujrat", 32.5731, 74.0789),
    ("Hafizabad", 32.0709, 73.6880),
    ("Jhang", 31.2681, 72.3181),
    ("Jhelum", 32.9425, 73.7257),
    ("Kasur", 31.1187, 74.4507),
    ("Khanewal", 30.3017, 71.9321),
    ("Khushab", 32.2955, 72.3489),
    ("Lahore", 31.5204, 74.3587),
    ("Layyah", 30.9693, 70.9428),
    ("Lodhran", 29.5339, 71.6324),
    ("Mandi Bahauddin", 32.5861, 73.4917),
    ("Mianwali", 32.5839, 71.5370),
    ("Multan", 30.1575, 71.5249),
    ("Muzaffargarh", 30.0736, 71.1805),
    ("Nankana Sahib", 31.4492, 73.7124),
    ("Narowal", 32.1020, 74.8730),
    ("Okara", 30.8138, 73.4534),
    ("Pakpattan", 30.3436, 73.3869),
    ("Rahim Yar Khan", 28.4202, 70.2952),
    ("Rajanpur", 29.1044, 70.3301),
    ("Rawalpindi", 33.5651, 73.0169),
    ("Sahiwal", 30.6682, 73.1114),
    ("Sargodha", 32.0836, 72.6711),
    ("Sheikhupura", 31.7131, 73.9783),
    ("Sialkot", 32.4945, 74.5229),
    ("Toba Tek Singh", 30.9709, 72.4826),
    ("Vehari", 30.0442, 72.3441),
];

/// Static table of district centroids consulted by district focus.
///
/// Lookups ignore surrounding whitespace and ASCII case, since boundary
/// overlays spell names inconsistently (`LAHORE`, `Lahore `).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gazetteer {
    districts: Vec<District>,
}

impl Default for Gazetteer {
    fn default() -> Self {
        Self::punjab()
    }
}

impl Gazetteer {
    pub fn new(districts: Vec<District>) -> Self {
        Self { districts }
    }

    pub fn punjab() -> Self {
        Self::new(
            PUNJAB_DISTRICTS
                .iter()
                .map(|&(name, latitude, longitude)| District {
                    name: name.to_string(),
                    latitude,
                    longitude,
                })
                .collect(),
        )
    }

    pub fn lookup(&self, name: &str) -> Option<&District> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return None;
        }
        self.districts
            .iter()
            .find(|district| district.name.eq_ignore_ascii_case(wanted))
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    pub fn len(&self) -> usize {
        self.districts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{District, Gazetteer};

    #[test]
    fn lookup_is_trimmed_and_case_insensitive() {
        let gazetteer = Gazetteer::punjab();
        let lahore = gazetteer.lookup("Lahore").expect("Lahore is a district");
        assert_eq!(lahore.latitude, 31.5204);
        assert_eq!(lahore.longitude, 74.3587);

        assert_eq!(gazetteer.lookup("  LAHORE "), Some(lahore));
        assert_eq!(
            gazetteer.lookup("toba tek singh").map(|d| d.name.as_str()),
            Some("Toba Tek Singh")
        );
    }

    #[test]
    fn unknown_or_blank_names_are_absent() {
        let gazetteer = Gazetteer::punjab();
        assert!(gazetteer.lookup("Nonexistent").is_none());
        assert!(gazetteer.lookup("   ").is_none());
    }

    #[test]
    fn district_names_are_unique() {
        let gazetteer = Gazetteer::punjab();
        for district in gazetteer.districts() {
            let matches = gazetteer
                .districts()
                .iter()
                .filter(|other| other.name.eq_ignore_ascii_case(&district.name))
                .count();
            assert_eq!(matches, 1, "{}", district.name);
        }
    }

    #[test]
    fn custom_gazetteer_deserializes_from_a_plain_list() {
        let gazetteer: Gazetteer = serde_json::from_str(
            r#"[{"name":"Islamabad","latitude":33.6844,"longitude":73.0479}]"#,
        )
        .expect("gazetteer should parse");
        assert_eq!(gazetteer.len(), 1);
        assert_eq!(
            gazetteer.lookup("islamabad"),
            Some(&District {
                name: "Islamabad".to_string(),
                latitude: 33.6844,
                longitude: 73.0479,
            })
        );
    }
}
