//! Maps coordinates to IANA time zones using the polygon dataset bundled with `tzf-rs`.

use {
    crate::error::ImportError, anyhow::Result, gallery_shared::Location, lazy_static::lazy_static,
    tzf_rs::DefaultFinder,
};

lazy_static! {
    // Loading the dataset takes a noticeable fraction of a second, so do it once.
    static ref FINDER: DefaultFinder = DefaultFinder::new();
}

/// Every zone whose boundary contains `location`, in the order the dataset reports them
pub fn candidates(location: &Location) -> Vec<String> {
    FINDER
        .get_tz_names(location.lng, location.lat)
        .into_iter()
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// The time zone at `location`, taking the first candidate if boundaries overlap.
pub fn resolve(location: &Location) -> Result<String> {
    candidates(location).into_iter().next().ok_or_else(|| {
        ImportError::NoTimezone {
            lat: location.lat,
            lng: location.lng,
        }
        .into()
    })
}
