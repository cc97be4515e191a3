//! Normalization of docset symbol type labels.
//!
//! Dash docsets use short token codes (`clm`, `instp`, `intfopfunc`), while
//! Doxygen- and Devhelp-generated indexes use section headings like
//! `Public Member Functions`. Both are collapsed into one closed vocabulary
//! so that symbol filtering and per-type counts behave the same across
//! repositories.

/// Maps a raw docset type label to the normalized vocabulary.
///
/// Labels without a known mapping pass through unchanged; the empty label
/// maps to `Unknown`.
pub fn map_type(label: &str) -> &str {
    match label {
        // Attribute
        "Package Attributes"
        | "Private Attributes"
        | "Protected Attributes"
        | "Public Attributes"
        | "Static Package Attributes"
        | "Static Private Attributes"
        | "Static Protected Attributes"
        | "Static Public Attributes"
        | "XML Attributes"
        | "attribute" => "Attribute",
        // Binding
        "binding" => "Binding",
        // Category
        "cat" | "Groups" | "Pages" => "Category",
        // Class
        "cl" | "specialization" | "tmplt" | "class" | "Classes" => "Class",
        // Constant
        "data" | "econst" | "enumdata" | "enumelt" | "clconst" | "structdata" | "writerid"
        | "Notifications" | "constant" | "Flags" => "Constant",
        // Constructor
        "structctr" | "Public Constructors" => "Constructor",
        // Enumeration
        "enum" | "Enum" | "Enumerations" | "Enums" => "Enumeration",
        // Event
        "event" | "Public Events" | "Inherited Events" | "Private Events" => "Event",
        // Field
        "Data Fields" => "Field",
        // Function
        "dcop"
        | "func"
        | "ffunc"
        | "signal"
        | "slot"
        | "grammar"
        | "Function Prototypes"
        | "Functions/Subroutines"
        | "Members"
        | "Package Functions"
        | "Private Member Functions"
        | "Private Slots"
        | "Protected Member Functions"
        | "Protected Slots"
        | "Public Member Functions"
        | "Public Slots"
        | "Signals"
        | "Static Package Functions"
        | "Static Private Member Functions"
        | "Static Protected Member Functions"
        | "Static Public Member Functions"
        | "function" => "Function",
        // Guide
        "doc" => "Guide",
        // Namespace
        "ns" => "Namespace",
        // Macro
        "macro" => "Macro",
        // Method
        "clm" | "enumcm" | "enumctr" | "enumm" | "intfctr" | "intfcm" | "intfm" | "intfsub"
        | "instsub" | "instctr" | "instm" | "structcm" | "structm" | "structsub"
        | "Class Methods" | "Inherited Methods" | "Instance Methods" | "Private Methods"
        | "Protected Methods" | "Public Methods" | "method" | "member" => "Method",
        // Operator
        "intfopfunc" | "opfunc" => "Operator",
        // Property
        "enump" | "intfdata" | "intfp" | "instp" | "structp" | "Inherited Properties"
        | "Private Properties" | "Protected Properties" | "Public Properties" | "property" => {
            "Property"
        },
        // Protocol
        "intf" => "Protocol",
        // Structure
        "struct" | "Data Structures" | "Struct" | "Class Structures" => "Structure",
        // Type
        "tag" | "tdef" | "Data Types" | "Package Types" | "Private Types" | "Protected Types"
        | "Public Types" | "Typedefs" | "typedef" => "Type",
        // Variable
        "var" | "variable" => "Variable",
        "" => "Unknown",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::map_type;

    #[test]
    fn maps_dash_token_codes() {
        assert_eq!(map_type("clm"), "Method");
        assert_eq!(map_type("instp"), "Property");
        assert_eq!(map_type("intfopfunc"), "Operator");
        assert_eq!(map_type("tdef"), "Type");
        assert_eq!(map_type("cl"), "Class");
    }

    #[test]
    fn maps_section_headings() {
        assert_eq!(map_type("Public Slots"), "Function");
        assert_eq!(map_type("Public Methods"), "Method");
        assert_eq!(map_type("Class Structures"), "Structure");
        assert_eq!(map_type("Data Fields"), "Field");
        assert_eq!(map_type("Flags"), "Constant");
    }

    #[test]
    fn empty_label_is_unknown() {
        assert_eq!(map_type(""), "Unknown");
    }

    #[test]
    fn unmapped_labels_pass_through() {
        assert_eq!(map_type("UnknownLabel"), "UnknownLabel");
        assert_eq!(map_type("Guide"), "Guide");
    }
}
