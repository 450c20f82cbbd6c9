use blinds_control::{
    configuration::ControllerConfig,
    controller::NiceController,
    directory::Directory,
    protocol::{Command, DeviceId},
    BlindsError,
};
use secrecy::Secret;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEVICE_LIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<devlst>
  <device mac="00:01" productName="Era Roller" adr="1" ept="01" desc="MBA 3" installed="1" sta="00" pos="100" inp="0"/>
  <device mac="00:0e" productName="Era Roller" adr="1" ept="0e" desc="Office 1" installed="1" sta="03" pos="40" inp="0"/>
  <device mac="00:ff" productName="Era Roller" adr="1" ept="1A" desc="Garage" installed="0" sta="00" pos="255" inp="0"/>
</devlst>"#;

fn controller(server: &MockServer) -> NiceController {
    let mut config = ControllerConfig::new(&format!("{}/", server.uri()));
    config.username = Some(String::from("admin"));
    config.password = Some(Secret::new(String::from("secret")));
    NiceController::new(&config).unwrap()
}

async fn mount_device_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/cgi/devlst.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DEVICE_LIST))
        .mount(server)
        .await;
}

#[tokio::test]
async fn discovers_installed_devices() {
    let server = MockServer::start().await;
    mount_device_list(&server).await;

    let devices = controller(&server).discover_devices().await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].name, "MBA 3");
    assert_eq!(devices[0].id.to_string(), "1,01");
    assert_eq!(devices[1].id.to_string(), "1,0E");
    assert_eq!(devices[1].module, "Era Roller (1,14)");
}

#[tokio::test]
async fn unauthorized_device_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi/devlst.xml"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = controller(&server).discover_devices().await;
    assert!(matches!(result, Err(BlindsError::Unauthorized)));
}

#[tokio::test]
async fn login_page_instead_of_xml() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi/devlst.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<!DOCTYPE html><html><body>Login</body></html>"),
        )
        .mount(&server)
        .await;

    let result = controller(&server).discover_devices().await;
    assert!(matches!(result, Err(BlindsError::LoginPage)));
}

#[tokio::test]
async fn device_command_uses_query_and_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi/devcmd.xml"))
        .and(query_param("adr", "1"))
        .and(query_param("ept", "0F"))
        .and(query_param("cmd", "03"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<devcmd/>"))
        .expect(1)
        .mount(&server)
        .await;

    let id: DeviceId = "1,0f".parse().unwrap();
    controller(&server)
        .send_command(&id, Command::Open)
        .await
        .unwrap();
}

#[tokio::test]
async fn device_command_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi/devcmd.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let id: DeviceId = "1,01".parse().unwrap();
    let result = controller(&server).send_command(&id, Command::Stop).await;
    assert!(matches!(result, Err(BlindsError::Http(_))));
}

#[tokio::test]
async fn group_commands() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi/grpcmd.xml"))
        .and(query_param("req", "R"))
        .and(query_param("num", "1"))
        .and(query_param("dat", "04000000"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<grpcmd><result>0</result></grpcmd>"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cgi/grpcmd.xml"))
        .and(query_param("num", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<grpcmd><result>3</result></grpcmd>"),
        )
        .mount(&server)
        .await;

    let controller = controller(&server);
    controller
        .send_group_command("1", Command::Close)
        .await
        .unwrap();

    match controller.send_group_command("2", Command::Open).await {
        Err(BlindsError::GroupCommandRejected { num, result }) => {
            assert_eq!(num, "2");
            assert_eq!(result, "3");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn device_status_lookup() {
    let server = MockServer::start().await;
    mount_device_list(&server).await;
    let controller = controller(&server);

    let status = controller
        .device_status(&"1,0e".parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.position(), Some(40));
    assert_eq!(status.sta, "03");

    let missing = controller
        .device_status(&"2,01".parse().unwrap())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn connection_test() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    assert!(controller(&server).test_connection().await);

    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&broken)
        .await;
    assert!(!controller(&broken).test_connection().await);
}

#[tokio::test]
async fn directory_survives_missing_group_list() {
    let server = MockServer::start().await;
    mount_device_list(&server).await;
    Mock::given(method("GET"))
        .and(path("/cgi/grplst.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let directory = Directory::discover(&controller(&server), vec![])
        .await
        .unwrap();
    assert_eq!(directory.devices().len(), 2);
    assert!(directory.controller_groups().is_empty());
}

#[tokio::test]
async fn truncated_device_list_is_an_error() {
    let server = MockServer::start().await;
    let truncated = DEVICE_LIST.trim_end().trim_end_matches("</devlst>");
    Mock::given(method("GET"))
        .and(path("/cgi/devlst.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(truncated))
        .mount(&server)
        .await;

    let result = controller(&server).discover_devices().await;
    assert!(matches!(result, Err(BlindsError::Xml(_))), "{:?}", result);
}

#[tokio::test]
async fn plain_text_device_list_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi/devlst.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let result = controller(&server).discover_devices().await;
    assert!(matches!(result, Err(BlindsError::MalformedXml(_))), "{:?}", result);
}
