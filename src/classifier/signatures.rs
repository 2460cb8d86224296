//! Static signature tables for building-management and embedded web interfaces.
//!
//! Scores: 10 = vendor/product name, 5 = likely related term, 1-3 = generic
//! protocol or device indicator.

/// Keywords identifying one named system.
pub struct VendorSignature {
    pub system: &'static str,
    pub keywords: &'static [(&'static str, u32)],
}

/// One (label, keyword, score) rule, flattened from the vendor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureRule {
    pub label: &'static str,
    pub keyword: &'static str,
    pub score: u32,
}

/// A regex applied to page content. `{}` in the label is replaced by the first capture group.
pub struct RegexClue {
    pub pattern: &'static str,
    pub label: &'static str,
    pub score: u32,
}

/// Known literal values of one response header; the first matching needle wins.
pub struct HeaderClue {
    pub header: &'static str,
    pub matches: &'static [(&'static [&'static str], &'static str, u32)],
}

pub const GENERIC_PREFIX: &str = "Generic BMS (";

/// Substrings that mark a candidate as a strong indicator in tie-breaks.
pub const STRONG_INDICATORS: [&str; 5] = ["niagara", "webctrl", "metasys", "desigo", "tracer"];

pub static VENDOR_SIGNATURES: &[VendorSignature] = &[
    VendorSignature {
        system: "Johnson Controls",
        keywords: &[
            ("Metasys", 10),
            ("ADX", 10),
            ("NAE", 10),
            ("FEC", 10),
            ("NCE", 10),
            ("Johnson Controls", 10),
            ("JCI", 8),
        ],
    },
    VendorSignature {
        system: "Siemens",
        keywords: &[
            ("Desigo", 10),
            ("APOGEE", 10),
            ("PXC", 10),
            ("TALON", 10),
            ("Siemens", 10),
            ("Building Technologies", 5),
            ("Insight", 8),
        ],
    },
    VendorSignature {
        system: "Honeywell",
        keywords: &[
            ("WEBs", 10),
            ("Niagara", 10),
            ("EBI", 10),
            ("ComfortPoint", 10),
            ("Excel Web", 10),
            ("Honeywell", 10),
        ],
    },
    VendorSignature {
        system: "Schneider Electric",
        keywords: &[
            ("StruxureWare", 10),
            ("EcoStruxure", 10),
            ("Andover", 10),
            ("TAC", 10),
            ("SmartStruxure", 10),
            ("Continuum", 10),
            ("Schneider", 10),
        ],
    },
    VendorSignature {
        system: "Trane",
        keywords: &[
            ("Tracer", 10),
            ("SC+", 10),
            ("Tracer ES", 10),
            ("Tracer Summit", 10),
            ("Trane", 10),
            ("Trane Integrated Systems", 5),
        ],
    },
    VendorSignature {
        system: "Automated Logic",
        keywords: &[("WebCTRL", 10), ("ALC", 10), ("Automated Logic", 10)],
    },
    VendorSignature {
        system: "Delta Controls",
        keywords: &[
            ("enteliWEB", 10),
            ("ORCAview", 10),
            ("enteliVIZ", 10),
            ("Delta Controls", 10),
        ],
    },
    VendorSignature {
        system: "Alerton",
        keywords: &[
            ("Ascent", 10),
            ("BACtalk", 10),
            ("Compass", 10),
            ("VisualLogic", 10),
            ("Envision", 10),
            ("Alerton", 10),
        ],
    },
    VendorSignature {
        system: "Carrier",
        keywords: &[
            ("i-Vu", 10),
            ("ComfortVIEW", 10),
            ("ComfortWORKS", 10),
            ("Carrier", 10),
        ],
    },
    VendorSignature {
        system: "Distech Controls",
        keywords: &[
            ("EC-NetAX", 10),
            ("ECLYPSE", 10),
            ("ENVYSION", 10),
            ("Distech", 10),
            ("Smart Thermostats", 5),
        ],
    },
    VendorSignature {
        system: "Tridium",
        keywords: &[
            ("Niagara Framework", 10),
            ("JACE", 10),
            ("Niagara AX", 10),
            ("Niagara N4", 10),
            ("Tridium", 10),
            ("Niagara", 8),
        ],
    },
    VendorSignature {
        system: "KMC Controls",
        keywords: &[
            ("KMC Commander", 10),
            ("Total Control", 10),
            ("KMC Controls", 10),
        ],
    },
    VendorSignature {
        system: "Reliable Controls",
        keywords: &[
            ("MACH-System", 10),
            ("RC-WebView", 10),
            ("Reliable Controls", 10),
        ],
    },
    VendorSignature {
        system: "Crestron",
        keywords: &[
            ("Crestron Fusion", 10),
            ("Crestron Control", 8),
            ("Crestron", 10),
        ],
    },
    VendorSignature {
        system: "Mitsubishi Electric",
        keywords: &[
            ("AE-200", 10),
            ("EW-50", 10),
            ("AG-150", 10),
            ("MELANS", 10),
            ("Mitsubishi Electric", 10),
        ],
    },
    VendorSignature {
        system: "Alpha Controls",
        keywords: &[
            ("Alpha Devices", 8),
            ("Alpha BAS", 8),
            ("Alpha Building", 5),
            ("ABCS", 10),
            ("Alpha Controls", 10),
        ],
    },
    VendorSignature {
        system: "Multitel",
        keywords: &[("Multitel", 10), ("Horizon", 8), ("IO devices", 2)],
    },
    VendorSignature {
        system: "Millennium",
        keywords: &[
            ("Millennium II", 10),
            ("Millennium Controller", 8),
            ("Mill II", 10),
            ("Mill-II", 10),
            ("MII", 10),
        ],
    },
    VendorSignature {
        system: "Quest Controls",
        keywords: &[
            ("TelSec", 10),
            ("TelsecXL", 10),
            ("TelsecXT", 10),
            ("Quest Controls", 10),
            ("Quest Monitor", 8),
            ("Quest NET", 8),
        ],
    },
];

pub static GENERIC_KEYWORDS: &[(&str, u32)] = &[
    ("BACnet", 2),
    ("Modbus", 2),
    ("LonWorks", 2),
    ("Building Management System", 5),
    ("BMS", 5),
    ("Building Automation System", 5),
    ("BAS", 5),
    ("Building Automation", 5),
    ("HVAC Control", 5),
    ("Energy Management", 4),
    ("Facility Management", 4),
    ("SCADA", 3),
    ("PLC", 2),
    ("DDC", 3),
    ("Controller", 2),
    ("Remote Terminal", 2),
    ("RTU", 2),
    ("SNMP", 1),
    ("Telemetry", 1),
    ("Site Monitor", 3),
    ("Alarm Management", 3),
    ("Remote Monitoring", 3),
    ("Generator Control", 3),
    ("Environmental Monitoring", 3),
    ("Telecom Monitor", 3),
    ("IO Module", 2),
];

pub static REGEX_CLUES: &[RegexClue] = &[
    RegexClue {
        pattern: r#"(?i)<meta\s+name=["'](?:keywords|description)["']\s+content=["']([^"']*(?:BMS|BAS|HVAC|Building Control|SCADA|Metasys|Niagara|Tridium|WebCTRL)[^"']*)["']"#,
        label: "Generic BMS (Meta Tag)",
        score: 4,
    },
    RegexClue {
        pattern: r#"(?i)<meta\s+name=["'](?:generator|application-name)["']\s+content=["']([^"']+)["']"#,
        label: "Identified by Meta Tag: {}",
        score: 6,
    },
    RegexClue {
        pattern: r"(?i)<!--\s*Powered by (WebCTRL|Niagara Framework|Metasys)[^>]*-->",
        label: "{} (Comment)",
        score: 9,
    },
    RegexClue {
        pattern: r"(?i)(?:Building|System|HVAC) Login",
        label: "Generic BMS (Login Page)",
        score: 3,
    },
    RegexClue {
        pattern: r"(?i)Default Password",
        label: "Potential Embedded Device Login",
        score: 2,
    },
    RegexClue {
        pattern: r#"(?i)id=["'](?:loginForm|userName|userPassword)["']"#,
        label: "Generic Login Form Structure",
        score: 1,
    },
];

pub static HEADER_CLUES: &[HeaderClue] = &[
    HeaderClue {
        header: "server",
        matches: &[
            (&["niagara web server"], "Tridium Niagara (Server Header)", 10),
            (&["webctrl"], "Automated Logic (Server Header)", 9),
            (
                &["lighttpd", "apache", "nginx"],
                "Generic Embedded Device (Common Server)",
                1,
            ),
            (&["microsoft-iis"], "Potential Windows Server Host", 1),
        ],
    },
    HeaderClue {
        header: "x-powered-by",
        matches: &[(&["express", "asp.net"], "Standard Web Framework Detected", 1)],
    },
];

/// Every vendor keyword as a flat rule list.
pub fn rules() -> impl Iterator<Item = SignatureRule> {
    VENDOR_SIGNATURES.iter().flat_map(|sig| {
        sig.keywords.iter().map(move |&(keyword, score)| SignatureRule {
            label: sig.system,
            keyword,
            score,
        })
    })
}

pub fn is_vendor(name: &str) -> bool {
    VENDOR_SIGNATURES.iter().any(|s| s.system == name)
}

pub fn is_product_keyword(name: &str) -> bool {
    rules().any(|r| r.keyword.eq_ignore_ascii_case(name))
}
