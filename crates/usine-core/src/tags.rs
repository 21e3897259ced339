#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
}

pub const TEMPERATURE: Tag = Tag {
    key: "temperature",
    metric: "usine_temperature_celsius",
    label: "Temp",
    unit: "°C",
};

pub const HUMIDITY: Tag = Tag {
    key: "humidity",
    metric: "usine_humidity_percent",
    label: "Humidity",
    unit: "%",
};

pub const RPM: Tag = Tag {
    key: "rpm",
    metric: "usine_rotational_speed_rpm",
    label: "RPM",
    unit: "",
};

pub const VIBRATION: Tag = Tag {
    key: "vibration",
    metric: "usine_vibration_mm_per_second",
    label: "Vibration",
    unit: "mm/s",
};

pub const ENERGY_KWH: Tag = Tag {
    key: "energy_kwh",
    metric: "usine_energy_kwh",
    label: "Energy",
    unit: "kWh",
};

pub const UPTIME: Tag = Tag {
    key: "uptime",
    metric: "usine_uptime_seconds",
    label: "Uptime",
    unit: "s",
};

pub const STATUS: Tag = Tag {
    key: "status",
    metric: "usine_machine_status",
    label: "Status",
    unit: "",
};

pub const TIMESTAMP: Tag = Tag {
    key: "timestamp",
    metric: "usine_timestamp_seconds",
    label: "Timestamp",
    unit: "",
};

pub const MACHINE_ID: Tag = Tag {
    key: "machine_id",
    metric: "usine_machine_info",
    label: "Machine",
    unit: "",
};

/// Record fields in wire order.
pub const RECORD_TAGS: &[Tag] = &[
    TIMESTAMP,
    MACHINE_ID,
    TEMPERATURE,
    HUMIDITY,
    RPM,
    VIBRATION,
    ENERGY_KWH,
    UPTIME,
    STATUS,
];
