//! Recognition of passthrough resource declarations in VM configuration.

use crate::error::Result;
use crate::matcher::{Captures, Matches};
use crate::scan::{Finish, LineSource};
use crate::types::ResourceLabel;
use once_cell::sync::Lazy;
use regex::Regex;

/// `host=<token>` inside a USB device string.
static USB_HOST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bhost=([^,]+)").expect("Invalid USB host regex"));

/// A PCI address without its domain, e.g. `01:00.0` or `01:00`.
static SHORT_PCI_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{2}:[0-9a-f]{2}(\.[0-7])?$").expect("Invalid PCI address regex")
});

/// Matches from a pattern filter that classify to a label.
pub struct Labels<'p, S, F> {
    matches: Matches<'p, S>,
    classify: F,
}

impl<'p, S, F, L> Iterator for Labels<'p, S, F>
where
    S: LineSource,
    F: FnMut(&Captures) -> Option<L>,
{
    type Item = Result<L>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.matches.next()? {
                Ok(captures) => {
                    if let Some(label) = (self.classify)(&captures) {
                        return Some(Ok(label));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<S: LineSource, F> Finish for Labels<'_, S, F> {
    fn finish(self) -> Result<()> {
        self.matches.finish()
    }
}

impl<'p, S: LineSource> Matches<'p, S> {
    /// Keep only matches that `classify` assigns a label to.
    pub fn recognize<F, L>(self, classify: F) -> Labels<'p, S, F>
    where
        F: FnMut(&Captures) -> Option<L>,
    {
        Labels {
            matches: self,
            classify,
        }
    }
}

/// Classify one `key: value` configuration line.
///
/// Only PCI addresses (`hostpciN`) and USB host bindings (`usbN` with a
/// `host=` binding) are exclusive resources; everything else is `None`.
pub fn classify(key: &str, value: &str) -> Option<ResourceLabel> {
    if key.starts_with("hostpci") {
        let address = value.split(',').next().unwrap_or_default().trim();
        if address.is_empty() {
            return None;
        }
        return Some(ResourceLabel::new("hostpci", &normalize_pci_address(address)));
    }

    if key.starts_with("usb") {
        let captures = USB_HOST_PATTERN.captures(value)?;
        return Some(ResourceLabel::new(
            "hostusb",
            &captures[1].trim().to_ascii_lowercase(),
        ));
    }

    None
}

/// Classifier for captures of a `key: value` pattern (groups 1 and 2).
pub fn label_host_resource(captures: &Captures) -> Option<ResourceLabel> {
    classify(captures.get(1), captures.get(2))
}

/// `01:00.0` and `0000:01:00.0` name the same device.
fn normalize_pci_address(address: &str) -> String {
    let address = address.to_ascii_lowercase();
    if SHORT_PCI_ADDRESS.is_match(&address) {
        format!("0000:{address}")
    } else {
        address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::LineSourceExt;
    use crate::scan::StaticLines;

    fn label(key: &str, value: &str) -> String {
        classify(key, value)
            .map(|l| l.as_str().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_classify_pci() {
        assert_eq!(label("hostpci0", "0000:01:00.0,pcie=1"), "hostpci:0000:01:00.0");
        assert_eq!(label("hostpci1", "0000:02:00.0"), "hostpci:0000:02:00.0");
    }

    #[test]
    fn test_classify_pci_normalizes_address() {
        assert_eq!(label("hostpci0", "01:00.0,x-vga=1"), "hostpci:0000:01:00.0");
        assert_eq!(label("hostpci0", "0000:0A:00.1"), "hostpci:0000:0a:00.1");
        assert_eq!(label("hostpci0", "01:00"), "hostpci:0000:01:00");
        // mapped devices are kept verbatim
        assert_eq!(label("hostpci0", "mapping=gpu"), "hostpci:mapping=gpu");
    }

    #[test]
    fn test_classify_usb_normalizes_ids() {
        assert_eq!(label("usb0", "host=046D:C52B"), "hostusb:046d:c52b");
        assert_eq!(
            classify("usb0", "host=046D:C52B,usb3=1"),
            classify("usb1", "host=046d:c52b")
        );
    }

    #[test]
    fn test_classify_pci_empty_address() {
        assert_eq!(label("hostpci0", ",pcie=1"), "");
    }

    #[test]
    fn test_classify_usb() {
        assert_eq!(label("usb0", "host=1-1.2"), "hostusb:1-1.2");
        assert_eq!(label("usb1", "host=046d:c52b,usb3=1"), "hostusb:046d:c52b");
        assert_eq!(label("usb0", "spice"), "");
        assert_eq!(label("usb0", "usb3=1,ghost=1"), "");
    }

    #[test]
    fn test_classify_irrelevant_keys() {
        assert_eq!(label("ide2", "local:iso/win.iso,media=cdrom"), "");
        assert_eq!(label("net0", "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0"), "");
        assert_eq!(label("memory", "8192"), "");
    }

    #[test]
    fn test_labels_pipeline() {
        let pattern = Regex::new(r"^([A-Za-z][\w-]*):\s*(.+)$").unwrap();
        let config = StaticLines::from_output(
            "boot: order=scsi0\n\
             hostpci0: 0000:01:00.0,pcie=1\n\
             memory: 8192\n\
             usb0: spice\n\
             usb1: host=1-1.2\n\
             not a key value line\n",
        );
        let labels: Vec<String> = config
            .matching(&pattern)
            .recognize(label_host_resource)
            .map(|l| l.unwrap().to_string())
            .collect();
        assert_eq!(labels, vec!["hostpci:0000:01:00.0", "hostusb:1-1.2"]);
    }
}
