//! OGC Web Map Service address resolution
//!
//! [`WmsAddressResolver`] builds WMS GetMap URLs for tiles, implementing
//! the [`TileAddressResolver`] contract. It is pure string construction;
//! fetching and decoding the payload behind the URL is the
//! [`crate::sampler::TileDecoder`]'s job.
//!
//! WMS 1.3.0 swaps the bounding-box axis order to latitude-first for most
//! coordinate reference systems, keeping longitude-first only for CRS:84;
//! earlier protocol versions are always longitude-first.

use crate::geom::Sector;
use crate::pyramid::Level;
use crate::sampler::TileAddressResolver;

/// Configuration for a WMS layer's GetMap requests.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsLayerConfig {
    /// The WMS service address used to build GetMap URLs.
    pub service_address: String,
    /// The WMS protocol version.
    pub wms_version: String,
    /// Comma-separated list of WMS layer names.
    pub layer_names: String,
    /// Comma-separated list of WMS style names; the service default style
    /// is requested when absent.
    pub style_names: Option<String>,
    /// The coordinate reference system to request layers in.
    pub coordinate_system: String,
    /// The image content type to request; the service decides when absent.
    pub image_format: Option<String>,
    /// Whether GetMap requests ask for transparency.
    pub transparent: bool,
    /// The TIME parameter for temporal layers, omitted when absent.
    pub time_string: Option<String>,
}

impl WmsLayerConfig {
    /// Creates a configuration for `layer_names` served at
    /// `service_address`, with protocol version 1.3.0 and EPSG:4326
    /// coordinates.
    pub fn new(service_address: impl Into<String>, layer_names: impl Into<String>) -> Self {
        Self {
            service_address: service_address.into(),
            wms_version: "1.3.0".to_string(),
            layer_names: layer_names.into(),
            style_names: None,
            coordinate_system: "EPSG:4326".to_string(),
            image_format: None,
            transparent: true,
            time_string: None,
        }
    }

    /// Sets the WMS protocol version.
    pub fn with_wms_version(mut self, version: impl Into<String>) -> Self {
        self.wms_version = version.into();
        self
    }

    /// Sets the style names to request.
    pub fn with_style_names(mut self, styles: impl Into<String>) -> Self {
        self.style_names = Some(styles.into());
        self
    }

    /// Sets the coordinate reference system.
    pub fn with_coordinate_system(mut self, crs: impl Into<String>) -> Self {
        self.coordinate_system = crs.into();
        self
    }

    /// Sets the image content type to request.
    pub fn with_image_format(mut self, format: impl Into<String>) -> Self {
        self.image_format = Some(format.into());
        self
    }

    /// Sets whether to request transparency.
    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Sets the TIME parameter for temporal layers.
    pub fn with_time_string(mut self, time: impl Into<String>) -> Self {
        self.time_string = Some(time.into());
        self
    }
}

/// Builds WMS GetMap URLs for tile addresses.
#[derive(Debug, Clone)]
pub struct WmsAddressResolver {
    config: WmsLayerConfig,
}

impl WmsAddressResolver {
    pub fn new(config: WmsLayerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WmsLayerConfig {
        &self.config
    }

    /// Builds the GetMap URL requesting `sector` as a `width` x `height`
    /// image.
    pub fn url_for_sector(&self, sector: &Sector, width: u32, height: u32) -> String {
        let config = &self.config;
        let mut url = config.service_address.clone();

        // Normalize the query delimiter so the address ends with '?' or '&'.
        match url.find('?') {
            None => url.push('?'),
            Some(index) if index != url.len() - 1 => {
                if !url.ends_with('&') {
                    url.push('&');
                }
            }
            _ => {}
        }
        if !config.service_address.to_uppercase().contains("SERVICE=WMS") {
            url.push_str("SERVICE=WMS&");
        }

        url.push_str(&format!("VERSION={}", config.wms_version));
        url.push_str("&REQUEST=GetMap");
        url.push_str(&format!("&LAYERS={}", config.layer_names));
        url.push_str(&format!(
            "&STYLES={}",
            config.style_names.as_deref().unwrap_or("")
        ));

        if config.wms_version == "1.3.0" {
            url.push_str(&format!("&CRS={}", config.coordinate_system));
            // WMS 1.3.0 orders the bounding box latitude-first, except for
            // CRS:84 which stays longitude-first.
            if config.coordinate_system == "CRS:84" {
                url.push_str(&format!(
                    "&BBOX={},{},{},{}",
                    sector.min_longitude(),
                    sector.min_latitude(),
                    sector.max_longitude(),
                    sector.max_latitude()
                ));
            } else {
                url.push_str(&format!(
                    "&BBOX={},{},{},{}",
                    sector.min_latitude(),
                    sector.min_longitude(),
                    sector.max_latitude(),
                    sector.max_longitude()
                ));
            }
        } else {
            url.push_str(&format!("&SRS={}", config.coordinate_system));
            url.push_str(&format!(
                "&BBOX={},{},{},{}",
                sector.min_longitude(),
                sector.min_latitude(),
                sector.max_longitude(),
                sector.max_latitude()
            ));
        }

        url.push_str(&format!("&WIDTH={width}"));
        url.push_str(&format!("&HEIGHT={height}"));
        url.push_str(&format!(
            "&FORMAT={}",
            config.image_format.as_deref().unwrap_or("image/png")
        ));
        url.push_str(&format!(
            "&TRANSPARENT={}",
            if config.transparent { "TRUE" } else { "FALSE" }
        ));
        if let Some(time) = &config.time_string {
            url.push_str(&format!("&TIME={time}"));
        }

        url
    }
}

impl TileAddressResolver for WmsAddressResolver {
    fn resolve(&self, level: &Level, row: u32, column: u32) -> String {
        let sector = level.tile_sector(row, column);
        self.url_for_sector(&sector, level.tile_width, level.tile_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::TilePyramid;

    fn test_sector() -> Sector {
        Sector::new(0.0, 90.0, -180.0, -90.0)
    }

    #[test]
    fn builds_version_1_3_0_url_with_latitude_first_bbox() {
        let resolver =
            WmsAddressResolver::new(WmsLayerConfig::new("https://example.com/wms", "elevation"));
        let url = resolver.url_for_sector(&test_sector(), 256, 256);

        assert!(url.starts_with("https://example.com/wms?SERVICE=WMS&VERSION=1.3.0"));
        assert!(url.contains("&REQUEST=GetMap"));
        assert!(url.contains("&LAYERS=elevation"));
        assert!(url.contains("&STYLES=&"));
        assert!(url.contains("&CRS=EPSG:4326"));
        assert!(url.contains("&BBOX=0,-180,90,-90"));
        assert!(url.contains("&WIDTH=256&HEIGHT=256"));
        assert!(url.contains("&FORMAT=image/png"));
        assert!(url.contains("&TRANSPARENT=TRUE"));
        assert!(!url.contains("&TIME="));
    }

    #[test]
    fn crs84_keeps_longitude_first_bbox() {
        let config = WmsLayerConfig::new("https://example.com/wms", "elevation")
            .with_coordinate_system("CRS:84");
        let url = WmsAddressResolver::new(config).url_for_sector(&test_sector(), 64, 64);
        assert!(url.contains("&CRS=CRS:84"));
        assert!(url.contains("&BBOX=-180,0,-90,90"));
    }

    #[test]
    fn pre_130_versions_use_srs_and_longitude_first_bbox() {
        let config = WmsLayerConfig::new("https://example.com/wms", "elevation")
            .with_wms_version("1.1.1");
        let url = WmsAddressResolver::new(config).url_for_sector(&test_sector(), 64, 64);
        assert!(url.contains("VERSION=1.1.1"));
        assert!(url.contains("&SRS=EPSG:4326"));
        assert!(!url.contains("&CRS="));
        assert!(url.contains("&BBOX=-180,0,-90,90"));
    }

    #[test]
    fn existing_query_and_service_parameter_are_not_duplicated() {
        let config = WmsLayerConfig::new("https://example.com/wms?service=wms", "elevation");
        let url = WmsAddressResolver::new(config).url_for_sector(&test_sector(), 64, 64);
        assert_eq!(url.matches('?').count(), 1);
        assert_eq!(url.to_uppercase().matches("SERVICE=WMS").count(), 1);
        assert!(url.contains("&VERSION=1.3.0"));
    }

    #[test]
    fn optional_parameters_are_included_when_set() {
        let config = WmsLayerConfig::new("https://example.com/wms", "elevation")
            .with_style_names("default")
            .with_image_format("application/bil16")
            .with_transparent(false)
            .with_time_string("2024-01-01");
        let url = WmsAddressResolver::new(config).url_for_sector(&test_sector(), 64, 64);
        assert!(url.contains("&STYLES=default"));
        assert!(url.contains("&FORMAT=application/bil16"));
        assert!(url.contains("&TRANSPARENT=FALSE"));
        assert!(url.contains("&TIME=2024-01-01"));
    }

    #[test]
    fn resolves_tile_addresses_from_the_tile_sector() {
        let pyramid = TilePyramid::new(Sector::full_sphere(), 90.0, 256, 256, 1).unwrap();
        let resolver =
            WmsAddressResolver::new(WmsLayerConfig::new("https://example.com/wms", "elevation"));
        let url = resolver.resolve(pyramid.level(0).unwrap(), 0, 0);
        assert!(url.contains("&BBOX=0,-180,90,-90"));
        assert!(url.contains("&WIDTH=256&HEIGHT=256"));
    }
}
