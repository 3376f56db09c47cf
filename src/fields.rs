/// Field vocabularies for the river (reach + node) and lake products.
///
/// This is the single source of truth for which variables are pulled from a
/// record source and written to the output dataset. Everything downstream
/// (alignment, array building, writing) iterates these tables rather than
/// hardcoding field names.
///
/// Valid ranges follow the SWOT RiverSP / LakeSP product descriptions.

// ---------------------------------------------------------------------------
// Field metadata
// ---------------------------------------------------------------------------

/// Storage type of a field once it is built into a dense array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `f64`, NaN in memory, `FLOAT_FILL` on disk.
    Float,
    /// `i32` quality flag or count, `INT_FILL` when missing.
    Flag,
    /// String label, `STR_FILL` when missing.
    Text,
}

/// Where a node-level field's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrigin {
    /// Read from the record selected for that node and instant.
    Observed,
    /// Copied from the reach-level series into every node row.
    Reach,
}

/// Metadata for one output variable.
#[derive(Debug, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub origin: FieldOrigin,
    pub long_name: &'static str,
    pub units: &'static str,
    pub valid_min: Option<f64>,
    pub valid_max: Option<f64>,
    pub comment: &'static str,
}

const fn float(
    name: &'static str,
    long_name: &'static str,
    units: &'static str,
    valid_min: f64,
    valid_max: f64,
    comment: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Float,
        origin: FieldOrigin::Observed,
        long_name,
        units,
        valid_min: Some(valid_min),
        valid_max: Some(valid_max),
        comment,
    }
}

const fn flag(
    name: &'static str,
    long_name: &'static str,
    valid_max: f64,
    comment: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Flag,
        origin: FieldOrigin::Observed,
        long_name,
        units: "1",
        valid_min: Some(0.0),
        valid_max: Some(valid_max),
        comment,
    }
}

const fn from_reach(spec: FieldSpec) -> FieldSpec {
    FieldSpec {
        origin: FieldOrigin::Reach,
        ..spec
    }
}

const TIME: FieldSpec = FieldSpec {
    name: "time",
    kind: FieldKind::Float,
    origin: FieldOrigin::Observed,
    long_name: "time (UTC)",
    units: "seconds since 2000-01-01 00:00:00.000",
    valid_min: None,
    valid_max: None,
    comment: "Time of measurement in seconds in the UTC time scale since 1 Jan 2000 00:00:00 UTC.",
};

const TIME_STR: FieldSpec = FieldSpec {
    name: "time_str",
    kind: FieldKind::Text,
    origin: FieldOrigin::Observed,
    long_name: "UTC time",
    units: "",
    valid_min: None,
    valid_max: None,
    comment: "Time string giving UTC time. The format is YYYY-MM-DDThh:mm:ssZ.",
};

const SLOPE: FieldSpec = float(
    "slope",
    "water surface slope with respect to the geoid",
    "m/m",
    -0.001,
    0.1,
    "Fitted water surface slope relative to the geoid.",
);
const SLOPE_U: FieldSpec = float(
    "slope_u",
    "total uncertainty in the water surface slope",
    "m/m",
    0.0,
    0.1,
    "Total one-sigma uncertainty in the water surface slope.",
);
const SLOPE2: FieldSpec = float(
    "slope2",
    "enhanced water surface slope with respect to geoid",
    "m/m",
    -0.001,
    0.1,
    "Enhanced water surface slope from smoothed node heights.",
);
const SLOPE2_U: FieldSpec = float(
    "slope2_u",
    "uncertainty in the enhanced water surface slope",
    "m/m",
    0.0,
    0.1,
    "Total one-sigma uncertainty in the enhanced water surface slope.",
);
const D_X_AREA: FieldSpec = float(
    "d_x_area",
    "change in cross-sectional area",
    "m^2",
    -10_000_000.0,
    10_000_000.0,
    "Change in channel cross-sectional area from the median of all observations.",
);
const D_X_AREA_U: FieldSpec = float(
    "d_x_area_u",
    "total uncertainty of the change in the cross-sectional area",
    "m^2",
    0.0,
    10_000_000.0,
    "Total one-sigma uncertainty in the change in cross-sectional area.",
);
const ICE_CLIM_F: FieldSpec = flag(
    "ice_clim_f",
    "climatological ice cover flag",
    2.0,
    "0 = not ice covered, 1 = partially ice covered, 2 = fully ice covered.",
);
const ICE_DYN_F: FieldSpec = flag(
    "ice_dyn_f",
    "dynamical ice cover flag",
    2.0,
    "0 = not ice covered, 1 = partially ice covered, 2 = fully ice covered.",
);
const XOVR_CAL_Q: FieldSpec = flag(
    "xovr_cal_q",
    "quality of the cross-over calibration",
    2.0,
    "0 = good, 1 = suspect, 2 = bad.",
);

// ---------------------------------------------------------------------------
// Vocabularies
// ---------------------------------------------------------------------------

/// Reach-level variables, written with shape `(nt,)`.
pub static REACH_FIELDS: &[FieldSpec] = &[
    TIME,
    TIME_STR,
    SLOPE,
    SLOPE_U,
    SLOPE2,
    SLOPE2_U,
    float("width", "reach width", "m", 0.0, 100_000.0, "Reach width."),
    float(
        "width_u",
        "total uncertainty in the reach width",
        "m",
        0.0,
        100_000.0,
        "Total one-sigma uncertainty in the reach width.",
    ),
    float(
        "wse",
        "water surface elevation with respect to the geoid",
        "m",
        -1500.0,
        150_000.0,
        "Fitted reach surface elevation relative to the geoid.",
    ),
    float(
        "wse_u",
        "total uncertainty in the water surface elevation",
        "m",
        0.0,
        999_999.0,
        "Total one-sigma uncertainty in the reach surface elevation.",
    ),
    D_X_AREA,
    D_X_AREA_U,
    flag(
        "reach_q",
        "summary quality indicator for the reach",
        3.0,
        "0 = nominal, 1 = suspect, 2 = degraded, 3 = bad.",
    ),
    flag(
        "reach_q_b",
        "bitwise quality indicator for the reach",
        508_357_774.0,
        "Bitwise quality flags for the reach.",
    ),
    float(
        "dark_frac",
        "fractional area of dark water",
        "1",
        -1000.0,
        10_000.0,
        "Fraction of reach area covered by dark water.",
    ),
    ICE_CLIM_F,
    ICE_DYN_F,
    flag(
        "partial_f",
        "partial reach coverage flag",
        1.0,
        "0 = covers 50% or more of the reach, 1 = covers less than 50%.",
    ),
    flag(
        "n_good_nod",
        "number of nodes in the reach that have a valid WSE",
        100.0,
        "Number of nodes with a valid water surface elevation.",
    ),
    float(
        "obs_frac_n",
        "fraction of nodes that have a valid WSE",
        "1",
        0.0,
        1.0,
        "Fraction of nodes with a valid water surface elevation.",
    ),
    XOVR_CAL_Q,
];

/// Node-level variables, written with shape `(nx, nt)`.
pub static NODE_FIELDS: &[FieldSpec] = &[
    TIME,
    TIME_STR,
    from_reach(SLOPE),
    from_reach(SLOPE_U),
    from_reach(SLOPE2),
    from_reach(SLOPE2_U),
    from_reach(D_X_AREA),
    from_reach(D_X_AREA_U),
    float("width", "node width", "m", 0.0, 100_000.0, "Node width."),
    float(
        "width_u",
        "total uncertainty in the node width",
        "m",
        0.0,
        100_000.0,
        "Total one-sigma uncertainty in the node width.",
    ),
    float(
        "wse",
        "water surface elevation with respect to the geoid",
        "m",
        -1000.0,
        100_000.0,
        "Node water surface elevation relative to the geoid.",
    ),
    float(
        "wse_u",
        "total uncertainty in the water surface elevation",
        "m",
        0.0,
        999_999.0,
        "Total one-sigma uncertainty in the node surface elevation.",
    ),
    flag(
        "node_q",
        "summary quality indicator for the node",
        3.0,
        "0 = nominal, 1 = suspect, 2 = degraded, 3 = bad.",
    ),
    flag(
        "node_q_b",
        "bitwise quality indicator for the node",
        533_491_359.0,
        "Bitwise quality flags for the node.",
    ),
    float(
        "dark_frac",
        "fractional area of dark water",
        "1",
        0.0,
        1.0,
        "Fraction of node area covered by dark water.",
    ),
    ICE_CLIM_F,
    ICE_DYN_F,
    flag(
        "n_good_pix",
        "number of pixels that have a valid WSE",
        100_000.0,
        "Number of pixels assigned to the node with a valid elevation.",
    ),
    XOVR_CAL_Q,
];

/// Prior-lake variables, written with shape `(nt,)`.
pub static LAKE_FIELDS: &[FieldSpec] = &[
    TIME,
    TIME_STR,
    float(
        "wse",
        "water surface elevation with respect to the geoid",
        "m",
        -1000.0,
        100_000.0,
        "Lake water surface elevation relative to the geoid.",
    ),
    float(
        "wse_u",
        "total uncertainty in the water surface elevation",
        "m",
        0.0,
        999_999.0,
        "Total one-sigma uncertainty in the lake surface elevation.",
    ),
    float(
        "area_total",
        "total water surface area including dark water",
        "km^2",
        0.0,
        10_000_000.0,
        "Total estimated lake area, including dark water.",
    ),
    float(
        "area_tot_u",
        "uncertainty in the total water surface area",
        "km^2",
        0.0,
        10_000_000.0,
        "Total one-sigma uncertainty in the total lake area.",
    ),
    float(
        "delta_s_q",
        "storage change computed by quadratic method",
        "km^3",
        -1000.0,
        1000.0,
        "Storage change relative to the reference area and elevation.",
    ),
    flag(
        "quality_f",
        "summary quality indicator for the lake",
        3.0,
        "0 = nominal, 1 = suspect, 2 = degraded, 3 = bad.",
    ),
];

/// Looks up a field by name within a vocabulary.
pub fn find_field<'a>(fields: &'a [FieldSpec], name: &str) -> Option<&'a FieldSpec> {
    fields.iter().find(|f| f.name == name)
}

// ---------------------------------------------------------------------------
// Product descriptor
// ---------------------------------------------------------------------------

/// Output shape of a processing run.
///
/// River runs produce a reach group and a node group; lake runs produce a
/// single lake group with no node level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    #[default]
    River,
    Lake,
}

impl Product {
    /// Fields of the top-level (reach or lake) group.
    pub fn primary_fields(&self) -> &'static [FieldSpec] {
        match self {
            Product::River => REACH_FIELDS,
            Product::Lake => LAKE_FIELDS,
        }
    }

    /// Fields of the node group, if the product has one.
    pub fn node_fields(&self) -> Option<&'static [FieldSpec]> {
        match self {
            Product::River => Some(NODE_FIELDS),
            Product::Lake => None,
        }
    }

    /// Name of the top-level output group.
    pub fn primary_group(&self) -> &'static str {
        match self {
            Product::River => "reach",
            Product::Lake => "lake",
        }
    }

    /// Name of the identifier attribute / variable for the primary feature.
    pub fn id_name(&self) -> &'static str {
        match self {
            Product::River => "reach_id",
            Product::Lake => "lake_id",
        }
    }

    /// Hydrocron `feature` parameter for the primary feature.
    pub fn feature_name(&self) -> &'static str {
        match self {
            Product::River => "Reach",
            Product::Lake => "PriorLake",
        }
    }
}

impl std::str::FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "river" | "reach" => Ok(Product::River),
            "lake" => Ok(Product::Lake),
            other => Err(format!("unknown product '{other}', expected river or lake")),
        }
    }
}

/// Column list to request from a record source: the identifier column
/// followed by every observed field of the vocabulary.
pub fn request_columns(id_column: &str, fields: &[FieldSpec]) -> Vec<String> {
    std::iter::once(id_column.to_string())
        .chain(
            fields
                .iter()
                .filter(|f| f.origin == FieldOrigin::Observed)
                .map(|f| f.name.to_string()),
        )
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
