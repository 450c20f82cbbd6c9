//! Wire format of the Nice HTTP/XML controller.
//!
//! The controller serves three XML documents (`devlst.xml`, `grplst.xml` and
//! the reply to `grpcmd.xml`). Only attributes of `device`/`group` elements and
//! the text of `result` are used, wherever they appear in the document.

use crate::error::{BlindsError, Result};
use crate::status::DeviceStatus;
use quick_xml::errors::IllFormedError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::Serialize;
use std::{collections::HashMap, fmt, str::FromStr};

pub const DEVICE_LIST_PATH: &str = "cgi/devlst.xml";
pub const DEVICE_COMMAND_PATH: &str = "cgi/devcmd.xml";
pub const GROUP_LIST_PATH: &str = "cgi/grplst.xml";
pub const GROUP_COMMAND_PATH: &str = "cgi/grpcmd.xml";

const GROUP_COMMAND_PADDING: &str = "000000";
const LOGIN_PAGE_MARKERS: [&str; 4] = ["<!doctype html", "<html", "login", "password"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
    Open,
    Close,
}

impl Command {
    pub fn code(&self) -> &'static str {
        match self {
            Command::Stop => "02",
            Command::Open => "03",
            Command::Close => "04",
        }
    }

    pub fn group_data(&self) -> String {
        format!("{}{}", self.code(), GROUP_COMMAND_PADDING)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Stop => "stop",
            Command::Open => "open",
            Command::Close => "close",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = BlindsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stop" => Ok(Command::Stop),
            "open" => Ok(Command::Open),
            "close" => Ok(Command::Close),
            _ => Err(BlindsError::UnknownCommand(s.to_owned())),
        }
    }
}

/// Device address as used on the command endpoint.
///
/// `adr` is decimal, `ept` is upper case hex, written `adr,ept` (e.g. `1,0F`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceId {
    pub adr: u32,
    pub ept: String,
}

impl DeviceId {
    pub fn from_hex(adr: &str, ept: &str) -> Result<Self> {
        let adr = parse_hex(adr)?;
        parse_hex(ept)?;
        Ok(Self {
            adr,
            ept: ept.trim().to_uppercase(),
        })
    }

    pub fn ept_decimal(&self) -> u32 {
        // validated on construction
        parse_hex(&self.ept).unwrap_or_default()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.adr, self.ept)
    }
}

impl FromStr for DeviceId {
    type Err = BlindsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BlindsError::InvalidDeviceId(s.to_owned());
        let (adr, ept) = s.split_once(',').ok_or_else(invalid)?;
        if ept.contains(',') {
            return Err(invalid());
        }
        let adr = adr.trim().parse().map_err(|_| invalid())?;
        let ept = ept.trim();
        if ept.is_empty() || ept.len() > 2 || parse_hex(ept).is_err() {
            return Err(invalid());
        }
        Ok(Self {
            adr,
            ept: ept.to_uppercase(),
        })
    }
}

fn parse_hex(value: &str) -> Result<u32> {
    u32::from_str_radix(value.trim(), 16).map_err(|_| BlindsError::InvalidHex(value.to_owned()))
}

/// A `device` element of the device list
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub desc: String,
    pub product_name: String,
    pub mac: String,
    pub status: DeviceStatus,
}

impl DeviceRecord {
    pub fn name(&self) -> &str {
        if self.desc.trim().is_empty() {
            &self.product_name
        } else {
            self.desc.trim()
        }
    }

    pub fn module(&self) -> String {
        format!(
            "{} ({},{})",
            self.product_name,
            self.id.adr,
            self.id.ept_decimal()
        )
    }
}

/// Installed device as presented to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub module: String,
    pub mac: String,
}

impl From<&DeviceRecord> for DeviceInfo {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name().to_owned(),
            module: record.module(),
            mac: record.mac.clone(),
        }
    }
}

/// Group maintained by the controller itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerGroup {
    pub num: String,
    pub name: String,
}

pub fn looks_like_login_page(body: &str) -> bool {
    let body = body.to_lowercase();
    LOGIN_PAGE_MARKERS.iter().any(|marker| body.contains(marker))
}

fn attributes(element: &BytesStart) -> Result<HashMap<String, String>> {
    let mut table = HashMap::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        table.insert(key, value);
    }
    Ok(table)
}

/// Attribute tables of every element named `tag`, at any depth.
/// The body has to be one complete document with a single root element.
fn elements_named(xml: &str, tag: &[u8]) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<String> = vec![];
    let mut seen_root = false;
    let mut found = vec![];
    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                if open.is_empty() {
                    enter_root(&mut seen_root)?;
                }
                if element.local_name().as_ref() == tag {
                    found.push(attributes(&element)?);
                }
                open.push(String::from_utf8_lossy(element.name().as_ref()).into_owned());
            }
            Event::Empty(element) => {
                if open.is_empty() {
                    enter_root(&mut seen_root)?;
                }
                if element.local_name().as_ref() == tag {
                    found.push(attributes(&element)?);
                }
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Text(text) if open.is_empty() => {
                if !text.unescape()?.trim().is_empty() {
                    return Err(BlindsError::MalformedXml("text outside the root element"));
                }
            }
            Event::CData(_) if open.is_empty() => {
                return Err(BlindsError::MalformedXml("text outside the root element"));
            }
            Event::Eof => break,
            _ => (),
        }
    }

    if let Some(unclosed) = open.pop() {
        return Err(quick_xml::Error::from(IllFormedError::MissingEndTag(unclosed)).into());
    }
    if !seen_root {
        return Err(BlindsError::MalformedXml("no root element"));
    }
    Ok(found)
}

fn enter_root(seen_root: &mut bool) -> Result<()> {
    if *seen_root {
        return Err(BlindsError::MalformedXml("more than one root element"));
    }
    *seen_root = true;
    Ok(())
}

fn take_or(table: &mut HashMap<String, String>, key: &str, default: &str) -> String {
    table.remove(key).unwrap_or_else(|| default.to_owned())
}

/// Every device in the list, installed or not
pub fn parse_device_list(xml: &str) -> Result<Vec<DeviceRecord>> {
    elements_named(xml, b"device")?
        .into_iter()
        .map(|mut table| -> Result<DeviceRecord> {
            let product_name = take_or(&mut table, "productName", "Unknown");
            let id = DeviceId::from_hex(
                &take_or(&mut table, "adr", "0"),
                &take_or(&mut table, "ept", "0"),
            )?;
            Ok(DeviceRecord {
                id,
                desc: take_or(&mut table, "desc", &product_name),
                mac: take_or(&mut table, "mac", ""),
                status: DeviceStatus {
                    sta: take_or(&mut table, "sta", "00"),
                    pos: take_or(&mut table, "pos", "255"),
                    inp: take_or(&mut table, "inp", "0"),
                    installed: take_or(&mut table, "installed", "0") == "1",
                },
                product_name,
            })
        })
        .collect()
}

/// Enabled groups only
pub fn parse_group_list(xml: &str) -> Result<Vec<ControllerGroup>> {
    Ok(elements_named(xml, b"group")?
        .into_iter()
        .filter(|table| table.get("enabled").map(String::as_str) == Some("1"))
        .map(|mut table| {
            let num = take_or(&mut table, "num", "0");
            let name = table
                .remove("desc")
                .unwrap_or_else(|| format!("Group {}", num));
            ControllerGroup { num, name }
        })
        .collect())
}

/// Text of the first `result` element, `"0"` when it is missing or empty
pub fn parse_command_result(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut in_result = false;
    loop {
        match reader.read_event()? {
            Event::Start(element) if element.local_name().as_ref() == b"result" => {
                in_result = true;
            }
            Event::Empty(element) if element.local_name().as_ref() == b"result" => {
                return Ok(String::from("0"));
            }
            Event::Text(text) if in_result => {
                let result = text.unescape()?.trim().to_owned();
                if !result.is_empty() {
                    return Ok(result);
                }
            }
            Event::End(_) if in_result => return Ok(String::from("0")),
            Event::Eof => return Ok(String::from("0")),
            _ => (),
        }
    }
}
