//! Recognized device categories.
//!
//! The allow-list is a closed enum: a label that does not parse into a
//! `DeviceCategory` can never reach the smoother or the overlay map.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw model tag that has a distinct display spelling.
const RAW_TV_MONITOR: &str = "tvmonitor";
const TV_MONITOR: &str = "TV Monitor";

/// Class table of COCO-trained YOLO exports, in output order.
pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tvmonitor", "laptop", "mouse", "remote", "keyboard",
    "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase",
    "scissors", "teddy bear", "hair drier", "toothbrush",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    TvMonitor,
    Microwave,
    Oven,
    Toaster,
    Refrigerator,
    CellPhone,
    Laptop,
    Mouse,
    Remote,
    Keyboard,
}

impl DeviceCategory {
    pub const ALL: [DeviceCategory; 10] = [
        DeviceCategory::TvMonitor,
        DeviceCategory::Microwave,
        DeviceCategory::Oven,
        DeviceCategory::Toaster,
        DeviceCategory::Refrigerator,
        DeviceCategory::CellPhone,
        DeviceCategory::Laptop,
        DeviceCategory::Mouse,
        DeviceCategory::Remote,
        DeviceCategory::Keyboard,
    ];

    /// Canonical label as it appears after canonicalization.
    pub fn canonical(&self) -> &'static str {
        match self {
            DeviceCategory::TvMonitor => TV_MONITOR,
            DeviceCategory::Microwave => "microwave",
            DeviceCategory::Oven => "oven",
            DeviceCategory::Toaster => "toaster",
            DeviceCategory::Refrigerator => "refrigerator",
            DeviceCategory::CellPhone => "cell phone",
            DeviceCategory::Laptop => "laptop",
            DeviceCategory::Mouse => "mouse",
            DeviceCategory::Remote => "remote",
            DeviceCategory::Keyboard => "keyboard",
        }
    }

    /// Look up a canonical label in the allow-list. Matching is exact.
    pub fn from_canonical(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.canonical() == label)
    }

    /// Text shown on the overlay and used as the catalog lookup key.
    pub fn display_label(&self) -> String {
        match self {
            DeviceCategory::TvMonitor => TV_MONITOR.to_string(),
            other => title_case(other.canonical()),
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

/// Rewrite a raw model tag to its canonical spelling.
pub fn canonicalize(raw: &str) -> &str {
    if raw == RAW_TV_MONITOR {
        TV_MONITOR
    } else {
        raw
    }
}

/// Capitalize the first letter of each word and lowercase the rest.
pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
