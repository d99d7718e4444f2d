use super::*;

fn spec_with_metadata(metadata: serde_json::Value) -> KernelSpec {
    KernelSpec {
        argv: vec!["kernel".to_string(), "-f".to_string(), "{connection_file}".to_string()],
        display_name: "Test Kernel".to_string(),
        env: HashMap::new(),
        metadata: metadata.as_object().cloned().unwrap_or_default(),
    }
}

#[test]
fn test_no_provisioner_block() {
    let spec = spec_with_metadata(serde_json::json!({}));
    let block = spec.provisioner_spec().unwrap();
    assert!(block.is_none());
}

#[test]
fn test_provisioner_block_with_name() {
    let spec = spec_with_metadata(serde_json::json!({
        "kernel_provisioner": {"provisioner_name": "custom-provisioner"}
    }));
    let block = spec.provisioner_spec().unwrap().unwrap();
    assert_eq!(block.provisioner_name.as_deref(), Some("custom-provisioner"));
    assert!(block.config.is_empty());
}

#[test]
fn test_provisioner_block_with_config() {
    let spec = spec_with_metadata(serde_json::json!({
        "kernel_provisioner": {
            "provisioner_name": "custom-provisioner",
            "config": {"config_var_1": 42, "config_var_2": "X"}
        }
    }));
    let block = spec.provisioner_spec().unwrap().unwrap();
    assert_eq!(block.config.get("config_var_1"), Some(&serde_json::json!(42)));
    assert_eq!(block.config.get("config_var_2"), Some(&serde_json::json!("X")));
}

#[test]
fn test_malformed_provisioner_block() {
    let spec = spec_with_metadata(serde_json::json!({
        "kernel_provisioner": "not-an-object"
    }));
    let err = spec.provisioner_spec().unwrap_err();
    assert!(matches!(err, ProvisioningError::InvalidConfig { .. }));
}

#[test]
fn test_kernelspec_roundtrip() {
    let json = serde_json::json!({
        "argv": ["python", "-m", "kernel"],
        "display_name": "Python",
        "env": {"TEST_VARS": "a:b"},
        "metadata": {"kernel_provisioner": {"provisioner_name": "local-provisioner"}}
    });
    let spec: KernelSpec = serde_json::from_value(json).unwrap();
    assert_eq!(spec.argv.len(), 3);
    assert_eq!(spec.env.get("TEST_VARS").unwrap(), "a:b");
    let block = spec.provisioner_spec().unwrap().unwrap();
    assert_eq!(block.provisioner_name.as_deref(), Some("local-provisioner"));
}
