//! `linode_instance` schema.

use serde_json::{Value, json};

use super::{Attribute, Block, ResourceSchema, StateFunc, Validator};

const FILESYSTEMS: &[&str] = &["raw", "swap", "ext3", "ext4", "initrd"];
const SLOTS: [&str; 8] = ["sda", "sdb", "sdc", "sdd", "sde", "sdf", "sdg", "sdh"];

fn valid_root_pass(value: &Value) -> Option<String> {
    let pass = value.as_str()?;
    // Hashed values from state skip the length check.
    if crate::config::StateHasher::is_digest(pass) {
        return None;
    }
    let len = pass.chars().count();
    (!(6..=128).contains(&len)).then(|| format!("root_pass must be 6 to 128 characters, got {len}"))
}

fn valid_backup_window(value: &Value) -> Option<String> {
    let window = value.as_str()?;
    let ok = window == "Scheduling"
        || window
            .strip_prefix('W')
            .and_then(|hour| hour.parse::<u32>().ok())
            .is_some_and(|hour| hour <= 22 && hour % 2 == 0);
    (!ok).then(|| format!("'{window}' is not a backup window (W0, W2, ... W22)"))
}

fn interface_block() -> Block {
    Block::new(vec![
        Attribute::string("purpose")
            .default_value(json!("public"))
            .validate(Validator::OneOf(&["public", "vlan"]))
            .describe("Purpose of the interface."),
        Attribute::string("label").describe("VLAN label; only used with purpose vlan."),
        Attribute::string("ipam_address").describe("VLAN address in CIDR notation."),
    ])
}

fn device_block() -> Block {
    Block::new(vec![
        Attribute::string("disk_label").describe("Label of a declared disk."),
        Attribute::int("disk_id").optional_computed(),
        Attribute::int("volume_id").describe("Block storage volume id."),
    ])
}

fn config_block() -> Block {
    let devices = SLOTS
        .into_iter()
        .map(|slot| Attribute::single(slot, device_block()).optional_computed())
        .collect();

    Block::new(vec![
        Attribute::int("id").computed(),
        Attribute::string("label")
            .required()
            .validate(Validator::LengthBetween(1, 48)),
        Attribute::string("kernel")
            .optional_computed()
            .describe("Kernel id, e.g. linode/latest-64bit."),
        Attribute::string("run_level")
            .default_value(json!("default"))
            .validate(Validator::OneOf(&["default", "single", "binbash"])),
        Attribute::string("virt_mode")
            .default_value(json!("paravirt"))
            .validate(Validator::OneOf(&["paravirt", "fullvirt"])),
        Attribute::string("root_device").optional_computed(),
        Attribute::string("comments"),
        Attribute::int("memory_limit")
            .optional_computed()
            .validate(Validator::IntRange(0, i64::from(u32::MAX))),
        Attribute::single("devices", Block::new(devices)).optional_computed(),
        Attribute::single(
            "helpers",
            Block::new(vec![
                Attribute::bool("updatedb_disabled").default_value(json!(true)),
                Attribute::bool("distro").default_value(json!(true)),
                Attribute::bool("modules_dep").default_value(json!(true)),
                Attribute::bool("network").default_value(json!(true)),
                Attribute::bool("devtmpfs_automount").default_value(json!(false)),
            ]),
        )
        .optional_computed(),
        Attribute::block("interface", interface_block()),
    ])
}

fn disk_block() -> Block {
    Block::new(vec![
        Attribute::int("id").computed(),
        Attribute::string("label")
            .required()
            .validate(Validator::LengthBetween(1, 48)),
        Attribute::int("size")
            .required()
            .validate(Validator::IntRange(1, i64::MAX)),
        Attribute::string("filesystem")
            .optional_computed()
            .validate(Validator::OneOf(FILESYSTEMS)),
        Attribute::string("image").describe("Image to deploy; only read at creation."),
        Attribute::string("root_pass")
            .sensitive()
            .state(StateFunc::Sha256)
            .validate(Validator::Custom(valid_root_pass)),
        Attribute::string_list("authorized_keys").state(StateFunc::TrimSpace),
        Attribute::string_list("authorized_users"),
        Attribute::int("stackscript_id"),
        Attribute::string_map("stackscript_data").sensitive(),
    ])
}

/// Schema of the compute instance resource.
#[must_use]
pub fn instance_schema() -> ResourceSchema {
    ResourceSchema {
        type_name: "linode_instance",
        version: 1,
        description: "A Linode compute instance with its disks, configs and addresses.",
        block: Block::new(vec![
            Attribute::string("id").computed(),
            Attribute::string("label")
                .optional_computed()
                .validate(Validator::LengthBetween(1, 64)),
            Attribute::string("group"),
            Attribute::string("region").required().force_new(),
            Attribute::string("type")
                .default_value(json!("g6-standard-1"))
                .describe("Plan type."),
            Attribute::string("image")
                .force_new()
                .describe("Image to deploy; omit when declaring disks."),
            Attribute::int("backup_id").force_new(),
            Attribute::int("stackscript_id").force_new(),
            Attribute::string_map("stackscript_data").force_new().sensitive(),
            Attribute::string("root_pass")
                .force_new()
                .sensitive()
                .state(StateFunc::Sha256)
                .validate(Validator::Custom(valid_root_pass)),
            Attribute::string_list("authorized_keys")
                .force_new()
                .state(StateFunc::TrimSpace),
            Attribute::string_list("authorized_users").force_new(),
            Attribute::int("swap_size").optional_computed(),
            Attribute::bool("private_ip").optional_computed(),
            Attribute::bool("backups_enabled").optional_computed(),
            Attribute::bool("watchdog_enabled").default_value(json!(true)),
            Attribute::bool("booted").optional_computed(),
            Attribute::string("boot_config_label").optional_computed(),
            Attribute::bool("disk_expansion")
                .default_value(json!(false))
                .describe("Grow the implicit disk when resizing to a larger plan."),
            Attribute::string("migration_type")
                .default_value(json!("cold"))
                .validate(Validator::OneOf(&["cold", "warm"])),
            Attribute::string_set("tags"),
            Attribute::single(
                "alerts",
                Block::new(vec![
                    Attribute::int("cpu").optional_computed(),
                    Attribute::int("network_in").optional_computed(),
                    Attribute::int("network_out").optional_computed(),
                    Attribute::int("transfer_quota").optional_computed(),
                    Attribute::int("io").optional_computed(),
                ]),
            )
            .optional_computed(),
            Attribute::single(
                "backups",
                Block::new(vec![
                    Attribute::bool("enabled").computed(),
                    Attribute::single(
                        "schedule",
                        Block::new(vec![
                            Attribute::string("day").optional_computed().validate(Validator::OneOf(&[
                                "Scheduling",
                                "Sunday",
                                "Monday",
                                "Tuesday",
                                "Wednesday",
                                "Thursday",
                                "Friday",
                                "Saturday",
                            ])),
                            Attribute::string("window")
                                .optional_computed()
                                .validate(Validator::Custom(valid_backup_window)),
                        ]),
                    )
                    .optional_computed(),
                ]),
            )
            .optional_computed(),
            Attribute::single(
                "specs",
                Block::new(vec![
                    Attribute::int("disk").computed(),
                    Attribute::int("memory").computed(),
                    Attribute::int("vcpus").computed(),
                    Attribute::int("transfer").computed(),
                ]),
            )
            .computed(),
            Attribute::string("status").computed(),
            Attribute::string("ip_address").computed(),
            Attribute::string("private_ip_address").computed(),
            Attribute::string_set("ipv4").computed(),
            Attribute::string("ipv6").computed(),
            Attribute::block("interface", interface_block()),
            Attribute::block("disk", disk_block()).optional_computed(),
            Attribute::block("config", config_block()).optional_computed(),
            Attribute::block(
                "extra_ip",
                Block::new(vec![
                    Attribute::bool("public").default_value(json!(true)),
                    Attribute::string("address").computed(),
                    Attribute::string("gateway").computed(),
                    Attribute::int("prefix").computed(),
                    Attribute::string("subnet_mask").computed(),
                    Attribute::string("rdns").computed(),
                    Attribute::string("region").computed(),
                    Attribute::string("type").computed(),
                ]),
            ),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_instance_validates() {
        let schema = instance_schema();
        let tree = json!({
            "label": "t1",
            "type": "g6-nanode-1",
            "image": "linode/alpine3.14",
            "region": "us-east",
            "root_pass": "p4ssw0rd!",
            "swap_size": 256
        });
        assert!(schema.validate(&tree).is_ok());

        let mut too_long = tree;
        too_long["label"] = json!("x".repeat(65));
        assert_eq!(schema.validate(&too_long).unwrap_err().len(), 1);
    }

    #[test]
    fn test_composite_instance_validates() {
        let tree = json!({
            "label": "composite",
            "region": "us-east",
            "disk": [
                {"label": "boot", "size": 25000, "filesystem": "ext4", "image": "linode/alpine3.14", "root_pass": "p4ssw0rd!"},
                {"label": "swap", "size": 512, "filesystem": "swap"}
            ],
            "config": [{
                "label": "cfg",
                "kernel": "linode/latest-64bit",
                "root_device": "/dev/sda",
                "devices": {"sda": {"disk_label": "boot"}, "sdb": {"disk_label": "swap"}}
            }]
        });
        assert!(instance_schema().validate(&tree).is_ok());
    }

    #[test]
    fn test_bad_filesystem_and_window() {
        let tree = json!({
            "region": "us-east",
            "disk": [{"label": "boot", "size": 10, "filesystem": "zfs"}],
            "backups": [{"schedule": [{"window": "W23"}]}]
        });
        let errors = instance_schema().validate(&tree).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_region_and_image_force_replace() {
        let schema = instance_schema();
        let prior = json!({"region": "us-east", "image": "linode/debian12", "label": "web"});
        let proposed = json!({"region": "us-west", "image": "linode/debian12", "label": "web"});
        assert_eq!(schema.requires_replace(&prior, &proposed), vec!["region"]);
    }

    #[test]
    fn test_normalize_defaults_config_fields() {
        let normalized = instance_schema().normalize(&json!({
            "region": "us-east",
            "config": [{"label": "cfg"}]
        }));
        assert_eq!(normalized["config"][0]["run_level"], json!("default"));
        assert_eq!(normalized["config"][0]["virt_mode"], json!("paravirt"));
        assert_eq!(normalized["watchdog_enabled"], json!(true));
    }
}
