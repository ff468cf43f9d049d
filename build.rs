use std::collections::HashSet;
use std::path::Path;

const DEFAULT_PROTOCOL_ID: &str = "defaultProtocol";

fn main() {
    let catalog_path = Path::new("catalogs/protocols.json");
    validate_catalog_file(catalog_path);
    set_build_dependencies();
}

fn validate_catalog_file(catalog_path: &Path) {
    // Ensure catalog exists at build time
    assert!(
        catalog_path.exists(),
        "\n\nCATALOG BUILD ERROR: File not found\n\
         Path: {}\n\
         Please create the catalog file before building.\n",
        catalog_path.display()
    );

    let catalog_contents = std::fs::read_to_string(catalog_path).unwrap_or_else(|e| {
        panic!(
            "\n\nCATALOG BUILD ERROR: Failed to read file\n\
             Path: {}\n\
             Error: {e}\n",
            catalog_path.display()
        );
    });

    let catalog: serde_json::Value = serde_json::from_str(&catalog_contents).unwrap_or_else(|e| {
        panic!(
            "\n\nCATALOG BUILD ERROR: Invalid JSON\n\
             Path: {}\n\
             Error: {e}\n\
             Hint: Check for missing commas, brackets, or invalid syntax.\n",
            catalog_path.display()
        );
    });

    validate_catalog_structure(&catalog);
}

fn validate_catalog_structure(catalog: &serde_json::Value) {
    assert!(
        catalog.is_object(),
        "\n\nCATALOG BUILD ERROR: Root must be a JSON object\n\
         Got: {catalog}\n"
    );

    let protocols = catalog.get("protocols").unwrap_or_else(|| {
        panic!(
            "\n\nCATALOG BUILD ERROR: Missing 'protocols' field\n\
             The catalog must have a top-level 'protocols' array.\n"
        );
    });

    let protocols = protocols.as_array().unwrap_or_else(|| {
        panic!(
            "\n\nCATALOG BUILD ERROR: 'protocols' must be an array\n\
             Got: {protocols}\n"
        );
    });

    let total_stages = validate_protocols(protocols);

    println!(
        "cargo:warning=Validated catalog: {} protocols, {total_stages} total stages",
        protocols.len()
    );
}

fn validate_protocols(protocols: &[serde_json::Value]) -> usize {
    let mut seen = HashSet::new();
    let mut total_stages = 0;

    for (i, protocol) in protocols.iter().enumerate() {
        let id = protocol
            .get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_else(|| panic!("\n\nCATALOG BUILD ERROR: Protocol at index {i} missing 'id' field\n"));

        assert!(
            seen.insert(id.to_string()),
            "\n\nCATALOG BUILD ERROR: Duplicate protocol id '{id}' (index {i})\n"
        );

        total_stages += validate_protocol_stages(protocol, id);
    }

    assert!(
        seen.contains(DEFAULT_PROTOCOL_ID),
        "\n\nCATALOG BUILD ERROR: Missing '{DEFAULT_PROTOCOL_ID}' protocol\n\
         The catalog must contain the fallback protocol.\n"
    );

    total_stages
}

fn validate_protocol_stages(protocol: &serde_json::Value, id: &str) -> usize {
    let Some(stages) = protocol.get("stages").and_then(|s| s.as_array()) else {
        return 0;
    };

    for (j, stage) in stages.iter().enumerate() {
        assert!(
            stage.get("viewports").map_or(true, serde_json::Value::is_array),
            "\n\nCATALOG BUILD ERROR: Protocol '{id}' stage {j}: 'viewports' must be an array\n"
        );
    }
    stages.len()
}

fn set_build_dependencies() {
    // Tell cargo to rerun if catalog changes
    println!("cargo:rerun-if-changed=catalogs/protocols.json");

    // Tell cargo to rerun if build.rs changes
    println!("cargo:rerun-if-changed=build.rs");
}
