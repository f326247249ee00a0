#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::{Value, json};

    use crate::flow::Bandwidth;
    use crate::options::{
        FlowOptions, OptionMap, ToolCoercion, UdpFlowArgs, build_tls_options, build_udp_options,
        parse_option_pair,
    };
    use crate::protocol::{Protocol, Tool};

    fn map(pairs: &[(&str, Value)]) -> OptionMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn build(args: UdpFlowArgs) -> (FlowOptions, Option<ToolCoercion>) {
        build_udp_options(&args, &mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_dtls_forces_openssl() {
        for tool in [Tool::Iperf3, Tool::Netperf] {
            let (options, coercion) = build(UdpFlowArgs {
                tool,
                enable_dtls: true,
                ..Default::default()
            });
            assert_eq!(options.protocol(), Some(Protocol::Dtls));
            assert_eq!(options.tool(), Some(Tool::Openssl));
            assert_eq!(
                coercion,
                Some(ToolCoercion {
                    requested: tool.as_str().to_string()
                })
            );
        }
    }

    #[test]
    fn test_dtls_with_openssl_needs_no_coercion() {
        let (options, coercion) = build(UdpFlowArgs {
            tool: Tool::Openssl,
            enable_dtls: true,
            ..Default::default()
        });
        assert_eq!(options.tool(), Some(Tool::Openssl));
        assert_eq!(coercion, None);
    }

    #[test]
    fn test_udp_keeps_tool() {
        for tool in [Tool::Iperf3, Tool::Netperf, Tool::Openssl] {
            let (options, coercion) = build(UdpFlowArgs {
                tool,
                ..Default::default()
            });
            assert_eq!(options.protocol(), Some(Protocol::Udp));
            assert_eq!(options.tool(), Some(tool));
            assert_eq!(coercion, None);
        }
    }

    #[test]
    fn test_base_options() {
        let (options, _) = build(UdpFlowArgs {
            target_bandwidth: "5mbit".parse().unwrap(),
            tool: Tool::Netperf,
            ..Default::default()
        });
        assert_eq!(options.target_bw(), Some("5mbit"));
        assert_eq!(options.len(), 3);
        assert!(!options.contains_key("port_no"));
    }

    #[test]
    fn test_iperf3_port_in_range() {
        for seed in 0..256 {
            let (options, _) = build_udp_options(
                &UdpFlowArgs::default(),
                &mut StdRng::seed_from_u64(seed),
            );
            let port = options.port_no().expect("port assigned");
            assert!((1024..65536).contains(&port), "port {port} out of range");
        }
    }

    #[test]
    fn test_dtls_always_gets_port() {
        let (options, _) = build(UdpFlowArgs {
            tool: Tool::Netperf,
            enable_dtls: true,
            ..Default::default()
        });
        let port = options.port_no().expect("port assigned");
        assert!(port >= 1024);
    }

    #[test]
    fn test_explicit_port_passes_through() {
        for (tool, enable_dtls) in [
            (Tool::Iperf3, false),
            (Tool::Netperf, false),
            (Tool::Openssl, true),
        ] {
            let (options, _) = build(UdpFlowArgs {
                tool,
                enable_dtls,
                client_options: Some(map(&[("port_no", json!(80))])),
                ..Default::default()
            });
            assert_eq!(options.get("port_no"), Some(&json!(80)));
        }
    }

    #[test]
    fn test_client_options_win_over_server_options() {
        let (options, _) = build(UdpFlowArgs {
            tool: Tool::Netperf,
            server_options: Some(map(&[("port_no", json!(5001)), ("len", json!(1400))])),
            client_options: Some(map(&[("port_no", json!(6001)), ("rate", json!("hi"))])),
            ..Default::default()
        });
        assert_eq!(options.port_no(), Some(6001));
        assert_eq!(options.get("len"), Some(&json!(1400)));
        assert_eq!(options.get("rate"), Some(&json!("hi")));
    }

    #[test]
    fn test_user_values_override_defaults() {
        let (options, _) = build(UdpFlowArgs {
            server_options: Some(map(&[("target_bw", json!("20mbit"))])),
            ..Default::default()
        });
        assert_eq!(options.target_bw(), Some("20mbit"));
    }

    #[test]
    fn test_dtls_pins_tool_against_user_options() {
        let (options, coercion) = build(UdpFlowArgs {
            tool: Tool::Openssl,
            enable_dtls: true,
            client_options: Some(map(&[("tool", json!("iperf3")), ("protocol", json!("udp"))])),
            ..Default::default()
        });
        assert_eq!(options.protocol(), Some(Protocol::Dtls));
        assert_eq!(options.tool(), Some(Tool::Openssl));
        assert_eq!(
            coercion,
            Some(ToolCoercion {
                requested: "iperf3".into()
            })
        );
    }

    #[test]
    fn test_user_dtls_protocol_coerces_tool() {
        let (options, coercion) = build(UdpFlowArgs {
            tool: Tool::Iperf3,
            client_options: Some(map(&[("protocol", json!("dtls"))])),
            ..Default::default()
        });
        assert_eq!(options.protocol(), Some(Protocol::Dtls));
        assert_eq!(options.tool(), Some(Tool::Openssl));
        assert!(coercion.is_some());
        assert!(options.port_no().is_some());
    }

    #[test]
    fn test_unknown_tool_option_passes_through() {
        let (options, coercion) = build(UdpFlowArgs {
            tool: Tool::Netperf,
            client_options: Some(map(&[("tool", json!("iperf2"))])),
            ..Default::default()
        });
        assert_eq!(options.get("tool"), Some(&json!("iperf2")));
        assert_eq!(options.tool(), None);
        assert_eq!(options.protocol(), Some(Protocol::Udp));
        assert_eq!(coercion, None);
    }

    #[test]
    fn test_non_string_protocol_passes_through() {
        let (options, coercion) = build(UdpFlowArgs {
            server_options: Some(map(&[("protocol", json!(17))])),
            ..Default::default()
        });
        assert_eq!(options.get("protocol"), Some(&json!(17)));
        assert_eq!(options.protocol(), None);
        assert_eq!(coercion, None);
        // The iperf3 argument still asks for a port
        assert!(options.port_no().is_some());
    }

    #[test]
    fn test_dtls_replaces_unknown_tool() {
        let (options, coercion) = build(UdpFlowArgs {
            tool: Tool::Openssl,
            enable_dtls: true,
            client_options: Some(map(&[("tool", json!("iperf2"))])),
            ..Default::default()
        });
        assert_eq!(options.get("tool"), Some(&json!("openssl")));
        assert_eq!(options.get("protocol"), Some(&json!("dtls")));
        assert_eq!(
            coercion,
            Some(ToolCoercion {
                requested: "iperf2".into()
            })
        );
    }

    #[test]
    fn test_tls_options() {
        let options = build_tls_options(&Bandwidth::default());
        assert_eq!(options.protocol(), Some(Protocol::Tls));
        assert_eq!(options.tool(), Some(Tool::Openssl));
        assert_eq!(options.target_bw(), Some("1mbit"));
        assert!(options.port_no().is_none());
    }

    #[test]
    fn test_options_serialize_flat() {
        let (options, _) = build(UdpFlowArgs {
            tool: Tool::Netperf,
            ..Default::default()
        });
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(
            value,
            json!({"protocol": "udp", "tool": "netperf", "target_bw": "1mbit"})
        );
    }

    #[test]
    fn test_parse_option_pair() {
        assert_eq!(parse_option_pair("port_no=5201").unwrap(), ("port_no".into(), json!(5201)));
        assert_eq!(parse_option_pair("reverse=true").unwrap(), ("reverse".into(), json!(true)));
        assert_eq!(parse_option_pair("ratio=0.5").unwrap(), ("ratio".into(), json!(0.5)));
        assert_eq!(parse_option_pair(" cc = cubic ").unwrap(), ("cc".into(), json!("cubic")));
        assert!(parse_option_pair("novalue").is_err());
        assert!(parse_option_pair("=5").is_err());
    }
}
