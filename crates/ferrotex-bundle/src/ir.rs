use serde::{Deserialize, Serialize};

/// Content-tree fragment handed to the document renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IrNode {
    Section {
        id: String,
        title: String,
        level: u8,
        children: Vec<IrNode>,
    },
    Paragraph {
        text: String,
    },
}

impl IrNode {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ir_json_is_tagged() {
        let node = IrNode::Section {
            id: "d-references".into(),
            title: "References".into(),
            level: 1,
            children: vec![IrNode::paragraph("[a] A")],
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "section");
        assert_eq!(json["children"][0]["type"], "paragraph");
        assert_eq!(json["children"][0]["text"], "[a] A");

        let back: IrNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
