// src/types.rs

//! Abstract column-type registry
//!
//! Maps the abstract column-type codes reported by database drivers (the
//! JDBC convention integers) to symbolic names, per-dialect DDL type
//! expressions, and datapackage logical types. The registry is a static
//! lookup table initialized at compile time; size-bearing types carry a
//! parametric `varchar()` form that is rendered from the column's stored
//! size.

/// Character and binary columns larger than this are promoted to
/// CLOB/BLOB and exported as sidecar files.
pub const LOB_THRESHOLD: i64 = 4000;

/// One row of the type registry.
#[derive(Debug, Clone, Copy)]
pub struct TypeSpec {
    /// Abstract type code (JDBC convention)
    pub code: i32,
    /// Short symbolic name
    pub name: &'static str,
    /// ISO SQL type expression
    pub iso: &'static str,
    /// SQLite override
    pub sqlite: &'static str,
    /// PostgreSQL override
    pub postgresql: &'static str,
    /// Oracle override
    pub oracle: &'static str,
    /// Datapackage logical type
    pub datapackage: &'static str,
}

/// The full registry. `varchar()` marks a parametric, size-bearing form.
static REGISTRY: &[TypeSpec] = &[
    TypeSpec { code: -16, name: "longnvarchar", iso: "clob", sqlite: "clob", postgresql: "text", oracle: "clob", datapackage: "string" },
    TypeSpec { code: -15, name: "nchar", iso: "varchar()", sqlite: "varchar()", postgresql: "varchar()", oracle: "varchar()", datapackage: "string" },
    TypeSpec { code: -9, name: "nvarchar", iso: "varchar()", sqlite: "varchar()", postgresql: "varchar()", oracle: "varchar()", datapackage: "string" },
    TypeSpec { code: -8, name: "rowid", iso: "varchar()", sqlite: "varchar()", postgresql: "varchar()", oracle: "varchar()", datapackage: "string" },
    TypeSpec { code: -7, name: "bit", iso: "boolean", sqlite: "boolean", postgresql: "boolean", oracle: "integer", datapackage: "integer" },
    TypeSpec { code: -6, name: "tinyint", iso: "integer", sqlite: "integer", postgresql: "integer", oracle: "integer", datapackage: "integer" },
    TypeSpec { code: -5, name: "bigint", iso: "bigint", sqlite: "bigint", postgresql: "bigint", oracle: "number", datapackage: "integer" },
    TypeSpec { code: -4, name: "longvarbinary", iso: "blob", sqlite: "blob", postgresql: "bytea", oracle: "blob", datapackage: "string" },
    TypeSpec { code: -3, name: "varbinary", iso: "blob", sqlite: "blob", postgresql: "bytea", oracle: "blob", datapackage: "string" },
    TypeSpec { code: -2, name: "binary", iso: "blob", sqlite: "blob", postgresql: "bytea", oracle: "blob", datapackage: "string" },
    TypeSpec { code: -1, name: "longvarchar", iso: "clob", sqlite: "clob", postgresql: "text", oracle: "clob", datapackage: "string" },
    TypeSpec { code: 1, name: "char", iso: "varchar()", sqlite: "varchar()", postgresql: "varchar()", oracle: "varchar()", datapackage: "string" },
    TypeSpec { code: 2, name: "numeric", iso: "numeric", sqlite: "numeric", postgresql: "numeric", oracle: "numeric", datapackage: "number" },
    TypeSpec { code: 3, name: "decimal", iso: "decimal", sqlite: "decimal", postgresql: "decimal", oracle: "decimal", datapackage: "number" },
    TypeSpec { code: 4, name: "integer", iso: "integer", sqlite: "integer", postgresql: "integer", oracle: "integer", datapackage: "integer" },
    TypeSpec { code: 5, name: "smallint", iso: "integer", sqlite: "integer", postgresql: "integer", oracle: "integer", datapackage: "integer" },
    TypeSpec { code: 6, name: "float", iso: "float", sqlite: "float", postgresql: "float", oracle: "number", datapackage: "number" },
    TypeSpec { code: 7, name: "real", iso: "real", sqlite: "real", postgresql: "real", oracle: "real", datapackage: "number" },
    TypeSpec { code: 8, name: "double", iso: "double precision", sqlite: "double precision", postgresql: "double precision", oracle: "double precision", datapackage: "number" },
    TypeSpec { code: 12, name: "varchar", iso: "varchar()", sqlite: "varchar()", postgresql: "varchar()", oracle: "varchar()", datapackage: "string" },
    TypeSpec { code: 16, name: "boolean", iso: "boolean", sqlite: "boolean", postgresql: "boolean", oracle: "integer", datapackage: "boolean" },
    TypeSpec { code: 91, name: "date", iso: "date", sqlite: "date", postgresql: "date", oracle: "date", datapackage: "date" },
    TypeSpec { code: 92, name: "time", iso: "time", sqlite: "time", postgresql: "time", oracle: "date", datapackage: "time" },
    TypeSpec { code: 93, name: "timestamp", iso: "timestamp", sqlite: "timestamp", postgresql: "timestamp", oracle: "timestamp", datapackage: "datetime" },
    TypeSpec { code: 2004, name: "blob", iso: "blob", sqlite: "blob", postgresql: "bytea", oracle: "blob", datapackage: "string" },
    TypeSpec { code: 2005, name: "clob", iso: "clob", sqlite: "clob", postgresql: "text", oracle: "clob", datapackage: "string" },
    TypeSpec { code: 2009, name: "sqlxml", iso: "clob", sqlite: "clob", postgresql: "text", oracle: "clob", datapackage: "string" },
    TypeSpec { code: 2011, name: "nclob", iso: "clob", sqlite: "clob", postgresql: "text", oracle: "clob", datapackage: "string" },
];

/// Look up the registry row for an abstract type code.
pub fn lookup(code: i32) -> Option<&'static TypeSpec> {
    REGISTRY.iter().find(|spec| spec.code == code)
}

/// Datapackage logical type for a code. Unknown codes fall back to string.
pub fn datapackage_type(code: i32) -> &'static str {
    lookup(code).map(|spec| spec.datapackage).unwrap_or("string")
}

/// Character-like codes: eligible for a `maxLength` constraint.
pub fn is_character(code: i32) -> bool {
    matches!(code, -16 | -15 | -9 | -8 | -1 | 1 | 12 | 2005 | 2009 | 2011)
}

/// Binary (blob-family) codes.
pub fn is_binary(code: i32) -> bool {
    matches!(code, -4 | -3 | -2 | 2004)
}

/// Character codes with a reliable declared size, eligible for the
/// MAX(LENGTH) probe when the declared size exceeds the LOB threshold.
pub fn is_probed_character(code: i32) -> bool {
    matches!(code, -15 | -9 | -8 | 1 | 12)
}

/// Date or timestamp codes (formatted as datetime text for SQLite targets).
pub fn is_date_or_timestamp(code: i32) -> bool {
    matches!(code, 91 | 93)
}

/// Time-of-day code.
pub fn is_time(code: i32) -> bool {
    code == 92
}

/// Whether a column of this code and size spills to a sidecar file on
/// export: every blob, and every character column past the LOB threshold.
pub fn spills_to_sidecar(code: i32, size: i64) -> bool {
    is_binary(code) || (is_character(code) && size > LOB_THRESHOLD)
}

/// Map a declared column type string (as found in SQLite table metadata)
/// to an abstract type code and declared size.
///
/// SQLite affinity rules apply for unknown declarations: anything
/// containing INT is an integer, CHAR/CLOB/TEXT are character types,
/// BLOB (or a missing declaration) is binary, the rest is numeric.
/// Unsized TEXT/CLOB declarations report the driver's unbounded size so
/// the probe and LOB promotion see them as oversized.
pub fn code_for_declared(declared: &str) -> (i32, i64) {
    const UNBOUNDED: i64 = 2_000_000_000;

    let decl = declared.trim().to_uppercase();
    let (base, size) = match decl.find('(') {
        Some(pos) => {
            let size = decl[pos + 1..]
                .trim_end_matches(')')
                .split(',')
                .next()
                .and_then(|n| n.trim().parse::<i64>().ok())
                .unwrap_or(0);
            (decl[..pos].trim().to_string(), size)
        }
        None => (decl.clone(), 0),
    };

    match base.as_str() {
        "BIGINT" => (-5, 0),
        "TINYINT" => (-6, 0),
        "SMALLINT" => (5, 0),
        "BIT" => (-7, 0),
        "BOOLEAN" | "BOOL" => (16, 0),
        "NUMERIC" => (2, 0),
        "DECIMAL" => (3, 0),
        "FLOAT" => (6, 0),
        "REAL" => (7, 0),
        "DOUBLE" | "DOUBLE PRECISION" => (8, 0),
        "DATE" => (91, 0),
        "TIME" => (92, 0),
        "DATETIME" | "TIMESTAMP" => (93, 0),
        "CHAR" | "CHARACTER" => (1, if size > 0 { size } else { 1 }),
        "NCHAR" => (-15, if size > 0 { size } else { 1 }),
        "VARCHAR" => (12, if size > 0 { size } else { UNBOUNDED }),
        "NVARCHAR" => (-9, if size > 0 { size } else { UNBOUNDED }),
        "TEXT" => (12, if size > 0 { size } else { UNBOUNDED }),
        "CLOB" => (2005, if size > 0 { size } else { UNBOUNDED }),
        "NCLOB" => (2011, if size > 0 { size } else { UNBOUNDED }),
        "BLOB" | "BYTEA" => (2004, 0),
        "BINARY" => (-2, size),
        "VARBINARY" => (-3, size),
        "LONGVARBINARY" => (-4, 0),
        _ if base.contains("INT") => (4, 0),
        _ if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") => {
            (12, if size > 0 { size } else { UNBOUNDED })
        }
        _ if base.contains("BLOB") || base.is_empty() => (2004, 0),
        _ => (2, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let spec = lookup(12).unwrap();
        assert_eq!(spec.name, "varchar");
        assert_eq!(spec.datapackage, "string");
        assert_eq!(spec.iso, "varchar()");

        assert!(lookup(9999).is_none());
    }

    #[test]
    fn test_datapackage_types() {
        assert_eq!(datapackage_type(4), "integer");
        assert_eq!(datapackage_type(8), "number");
        assert_eq!(datapackage_type(16), "boolean");
        assert_eq!(datapackage_type(91), "date");
        assert_eq!(datapackage_type(92), "time");
        assert_eq!(datapackage_type(93), "datetime");
        assert_eq!(datapackage_type(2004), "string");
        // Unknown codes fall back to string
        assert_eq!(datapackage_type(4242), "string");
    }

    #[test]
    fn test_character_and_binary_families() {
        for code in [-16, -15, -9, -8, -1, 1, 12, 2005, 2009, 2011] {
            assert!(is_character(code), "{code} should be character-like");
            assert!(!is_binary(code));
        }
        for code in [-4, -3, -2, 2004] {
            assert!(is_binary(code), "{code} should be binary");
            assert!(!is_character(code));
        }
    }

    #[test]
    fn test_sidecar_spill_policy() {
        // Blobs always spill
        assert!(spills_to_sidecar(2004, 0));
        assert!(spills_to_sidecar(-3, 10));
        // Character columns spill only past the threshold
        assert!(!spills_to_sidecar(12, 255));
        assert!(!spills_to_sidecar(12, LOB_THRESHOLD));
        assert!(spills_to_sidecar(12, LOB_THRESHOLD + 1));
        assert!(spills_to_sidecar(2005, 2_000_000_000));
        // Numbers never do
        assert!(!spills_to_sidecar(4, 2_000_000_000));
    }

    #[test]
    fn test_code_for_declared() {
        assert_eq!(code_for_declared("INTEGER"), (4, 0));
        assert_eq!(code_for_declared("integer"), (4, 0));
        assert_eq!(code_for_declared("BIGINT"), (-5, 0));
        assert_eq!(code_for_declared("VARCHAR(30)"), (12, 30));
        assert_eq!(code_for_declared("varchar(100000)"), (12, 100000));
        assert_eq!(code_for_declared("NUMERIC(10,2)"), (2, 0));
        assert_eq!(code_for_declared("BLOB"), (2004, 0));
        assert_eq!(code_for_declared("DATETIME"), (93, 0));

        // Unsized text declarations are unbounded
        let (code, size) = code_for_declared("TEXT");
        assert_eq!(code, 12);
        assert!(size > LOB_THRESHOLD);
        let (code, size) = code_for_declared("CLOB");
        assert_eq!(code, 2005);
        assert!(size > LOB_THRESHOLD);

        // Affinity fallbacks
        assert_eq!(code_for_declared("MEDIUMINT").0, 4);
        assert_eq!(code_for_declared("").0, 2004);
    }
}
