#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::error::FlowError;
    use crate::exec::SessionOutcome;
    use crate::test_helpers::{MockExecutor, mock_sessions, test_config};

    fn script(cmd: &crate::exec::CommandSpec) -> String {
        assert_eq!(cmd.program(), "bash");
        assert_eq!(cmd.arguments()[0], "-c");
        cmd.arguments()[1].clone()
    }

    #[tokio::test]
    async fn test_invalid_protocol_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = mock_sessions(MockExecutor::new(), test_config(dir.path()));

        for bad in ["udp", "quic", ""] {
            let err = sessions
                .run_client("ns-client", "10.0.0.2", Duration::from_secs(1), bad)
                .await
                .unwrap_err();
            assert!(matches!(err, FlowError::InvalidProtocol(_)), "{bad}: {err}");

            let err = sessions.start_server("ns-server", bad).await.unwrap_err();
            assert!(err.is_configuration());
        }

        assert!(sessions.executor().calls().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_tls_client_command() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = mock_sessions(MockExecutor::new(), test_config(dir.path()));

        sessions
            .run_client("ns-client", "10.0.0.2", Duration::from_secs(5), "tls")
            .await
            .unwrap();

        let exec = sessions.executor();
        assert_eq!(exec.bounds(), [Duration::from_secs(5)]);
        let calls = exec.namespaced_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].namespace(), Some("ns-client"));

        let script = script(&calls[0]);
        assert!(script.starts_with("while true; do echo \"Test message\"; sleep 1; done | "));
        assert!(script.contains("s_client -connect 10.0.0.2:443"));
        assert!(!script.contains("-dtls"));
        assert!(script.contains(&dir.path().join("client.crt").display().to_string()));
        assert!(script.contains(&dir.path().join("client.key").display().to_string()));
        assert!(script.ends_with("-quiet"));
    }

    #[tokio::test]
    async fn test_dtls_client_command_is_case_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = mock_sessions(MockExecutor::new(), test_config(dir.path()));

        sessions
            .run_client("ns-client", "10.0.0.2", Duration::from_secs(3), "DTLS")
            .await
            .unwrap();

        let calls = sessions.executor().namespaced_calls();
        let script = script(&calls[0]);
        assert!(script.contains("s_client -dtls -connect 10.0.0.2:4433"));
    }

    #[tokio::test]
    async fn test_ipv6_destination_is_bracketed() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = mock_sessions(MockExecutor::new(), test_config(dir.path()));

        sessions
            .run_client("ns-client", "fd00::2", Duration::from_secs(1), "tls")
            .await
            .unwrap();

        let script = script(&sessions.executor().namespaced_calls()[0]);
        assert!(script.contains("-connect '[fd00::2]:443'"));
    }

    #[tokio::test]
    async fn test_server_runs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = mock_sessions(MockExecutor::new(), test_config(dir.path()));

        let handle = sessions.start_server("ns-server", "dtls").await.unwrap();

        assert_eq!(handle.command.namespace(), Some("ns-server"));
        assert_eq!(handle.command.program(), "openssl");
        let args = handle.command.arguments();
        assert_eq!(args[0], "s_server");
        assert_eq!(args[1], "-dtls");
        let accept = args.iter().position(|a| a == "-accept").unwrap();
        assert_eq!(args[accept + 1], "4433");
        assert!(args.contains(&dir.path().join("server.key").display().to_string()));
        assert!(args.contains(&dir.path().join("server.crt").display().to_string()));
        assert!(sessions.executor().bounds().is_empty());
    }

    #[tokio::test]
    async fn test_tls_server_port() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = mock_sessions(MockExecutor::new(), test_config(dir.path()));

        let handle = sessions.start_server("ns-server", "tls").await.unwrap();
        let args = handle.command.arguments();
        assert!(!args.contains(&"-dtls".to_string()));
        let accept = args.iter().position(|a| a == "-accept").unwrap();
        assert_eq!(args[accept + 1], "443");
    }

    #[tokio::test]
    async fn test_failed_session_is_returned_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let exec = MockExecutor::new().with_outcome(SessionOutcome {
            status: Some(1),
            stderr: "connect:errno=111".into(),
            ..Default::default()
        });
        let sessions = mock_sessions(exec, test_config(dir.path()));

        let outcome = sessions
            .run_client("ns-client", "10.0.0.2", Duration::from_secs(5), "tls")
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.status, Some(1));
    }

    #[tokio::test]
    async fn test_isolated_credentials_per_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.isolate_credentials = true;
        let sessions = mock_sessions(MockExecutor::new(), config);

        sessions.start_server("ns-server", "tls").await.unwrap();
        sessions
            .run_client("ns-client", "10.0.0.2", Duration::from_secs(1), "tls")
            .await
            .unwrap();

        assert!(dir.path().join("ns-server").join("server.crt").exists());
        assert!(dir.path().join("ns-client").join("client.crt").exists());
        assert!(!dir.path().join("client.crt").exists());
    }
}
