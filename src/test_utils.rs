//! Shared test utilities and arbitrary generators for property-based testing.

use proptest::prelude::*;

use crate::types::{
    Exploit, FindingInfo, InfoFinder, Malware, Misconfiguration, Package, PluginFinding, Rootkit,
    Secret, Severity, Vulnerability,
};

pub fn arb_severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Critical),
        Just(Severity::High),
        Just(Severity::Medium),
        Just(Severity::Low),
        Just(Severity::Negligible),
    ]
}

pub fn arb_package() -> impl Strategy<Value = Package> {
    (
        "[a-z][a-z0-9-]{0,20}",
        "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
        prop::option::of("[a-z]{1,10}"),
        prop::collection::vec("[A-Z]{2,10}", 0..3),
    )
        .prop_map(|(name, version, language, licenses)| Package {
            name,
            version,
            language,
            licenses,
        })
}

pub fn arb_vulnerability() -> impl Strategy<Value = Vulnerability> {
    (
        "CVE-20[0-9]{2}-[0-9]{4,5}",
        arb_severity(),
        prop::option::of("[a-zA-Z0-9 ]{1,60}"),
        arb_package(),
    )
        .prop_map(|(vulnerability_name, severity, description, package)| Vulnerability {
            vulnerability_name,
            severity,
            description,
            package,
        })
}

pub fn arb_secret() -> impl Strategy<Value = Secret> {
    (
        "[0-9a-f]{16}",
        "[a-zA-Z0-9 ]{1,40}",
        "(/[a-z]{1,8}){1,4}",
        0u32..10_000,
        (0u32..200, 0u32..200),
    )
        .prop_map(
            |(fingerprint, description, file_path, start_line, (start_column, end_column))| {
                Secret {
                    fingerprint,
                    description,
                    file_path,
                    start_line,
                    start_column,
                    end_column,
                }
            },
        )
}

pub fn arb_misconfiguration() -> impl Strategy<Value = Misconfiguration> {
    (
        "[a-z]{2,12}",
        "CIS-[0-9]{1,2}\\.[0-9]{1,2}",
        "[a-zA-Z0-9 ]{1,60}",
        prop::option::of(arb_severity()),
    )
        .prop_map(|(scanner_name, test_id, message, severity)| Misconfiguration {
            scanner_name,
            test_id,
            message,
            severity,
            category: None,
            description: None,
            location: None,
            remediation: None,
        })
}

pub fn arb_finding_info() -> impl Strategy<Value = FindingInfo> {
    prop_oneof![
        arb_package().prop_map(FindingInfo::Package),
        arb_vulnerability().prop_map(FindingInfo::Vulnerability),
        arb_secret().prop_map(FindingInfo::Secret),
        ("[a-z]{1,12}", "[a-z]{1,12}", "[A-Z][a-z]{1,12}", "(/[a-z]{1,8}){1,4}").prop_map(
            |(malware_name, malware_type, rule_name, path)| FindingInfo::Malware(Malware {
                malware_name,
                malware_type,
                rule_name,
                path,
            })
        ),
        arb_misconfiguration().prop_map(FindingInfo::Misconfiguration),
        ("[a-z]{1,12}", "[a-z]{1,12}", "[a-zA-Z0-9 ]{1,40}").prop_map(
            |(rootkit_name, rootkit_type, message)| FindingInfo::Rootkit(Rootkit {
                rootkit_name,
                rootkit_type,
                message,
            })
        ),
        (
            "[a-z0-9-]{1,20}",
            "[a-zA-Z0-9 ]{1,40}",
            "CVE-20[0-9]{2}-[0-9]{4,5}",
            "[a-z]{1,12}",
            prop::collection::vec("https://[a-z]{3,10}\\.example", 0..3),
        )
            .prop_map(|(name, title, cve_id, source_db, urls)| FindingInfo::Exploit(Exploit {
                name,
                title,
                description: None,
                cve_id,
                source_db,
                urls,
            })),
        ("[a-z]{2,12}", "[A-Za-z]{2,20}", "[a-zA-Z0-9 ]{1,40}", "(/[a-z]{1,8}){1,4}").prop_map(
            |(scanner_name, info_type, data, path)| FindingInfo::InfoFinder(InfoFinder {
                scanner_name,
                info_type,
                data,
                path,
            })
        ),
        ("[a-z]{2,12}", "[A-Z]{2,4}-[0-9]{1,4}", "[a-zA-Z0-9 ]{1,40}").prop_map(
            |(plugin_name, rule_id, message)| FindingInfo::Plugin(PluginFinding {
                plugin_name,
                rule_id,
                message,
                severity: None,
            })
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        /// Every payload round-trips through its tagged JSON form.
        #[test]
        fn prop_finding_info_serde_roundtrip(info in arb_finding_info()) {
            let json = serde_json::to_string(&info).unwrap();
            let back: FindingInfo = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, info);
        }

        /// The finding key is a pure function of the payload.
        #[test]
        fn prop_finding_key_is_deterministic(info in arb_finding_info()) {
            prop_assert_eq!(info.key(), info.clone().key());
        }

        /// The serialized discriminator matches the category name.
        #[test]
        fn prop_object_type_tag_matches_category(info in arb_finding_info()) {
            let json = serde_json::to_value(&info).unwrap();
            prop_assert_eq!(json["objectType"].as_str().unwrap(), info.category().to_string());
        }
    }
}
