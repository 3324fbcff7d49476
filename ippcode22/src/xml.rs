//! XML ingest boundary (§6). Turns a raw XML document into a validated,
//! order-sorted `Vec<Instruction>`. Everything past this module operates
//! purely on that vector — it never looks at document order again, which is
//! what gives the "shuffling child elements changes nothing" property (§8).

use itertools::Itertools;
use roxmltree::Document;

use crate::argument::Argument;
use crate::error::IngestError;
use crate::instruction::Instruction;
use crate::opcode::Opcode;

const ALLOWED_ARG_TAGS: &[&str] = &["arg1", "arg2", "arg3"];

pub fn parse(source: &str) -> Result<Vec<Instruction>, IngestError> {
    let doc = Document::parse(source).map_err(|e| IngestError::NotWellFormed(e.to_string()))?;
    let root = doc.root_element();

    if root.tag_name().name() != "program" {
        return Err(IngestError::MissingRootTag);
    }
    let language = root
        .attribute("language")
        .ok_or(IngestError::MissingAttribute { tag: "program", attr: "language" })?;
    if !language.eq_ignore_ascii_case("IPPcode22") {
        return Err(IngestError::WrongLanguage);
    }

    // Root's only allowed children are <instruction>; `name`/`description`
    // are attributes of <program> itself, not child elements.
    for node in root.children().filter(|n| n.is_element()) {
        if node.tag_name().name() != "instruction" {
            return Err(IngestError::DisallowedTag(node.tag_name().name().to_string()));
        }
        for child in node.children().filter(|n| n.is_element()) {
            if !ALLOWED_ARG_TAGS.contains(&child.tag_name().name()) {
                return Err(IngestError::DisallowedTag(child.tag_name().name().to_string()));
            }
        }
    }

    let mut instructions = Vec::new();
    let mut seen_orders = std::collections::HashSet::new();

    for instr_node in root.children().filter(|n| n.is_element() && n.tag_name().name() == "instruction") {
        let order_text = instr_node
            .attribute("order")
            .ok_or(IngestError::MissingAttribute { tag: "instruction", attr: "order" })?;
        let order: i64 = order_text
            .parse()
            .map_err(|_| IngestError::NonNumericOrder(order_text.to_string()))?;
        if order <= 0 {
            return Err(IngestError::NonPositiveOrder(order_text.to_string()));
        }
        let order = order as u32;
        if !seen_orders.insert(order) {
            return Err(IngestError::DuplicateOrder(order));
        }

        let opcode_text = instr_node
            .attribute("opcode")
            .ok_or(IngestError::MissingAttribute { tag: "instruction", attr: "opcode" })?;
        let opcode = Opcode::from_name(opcode_text).ok_or_else(|| IngestError::UnknownOpcode(opcode_text.to_string()))?;

        let mut arg_nodes: Vec<_> = instr_node
            .children()
            .filter(|n| n.is_element() && n.tag_name().name().starts_with("arg"))
            .collect();
        arg_nodes.sort_by_key(|n| n.tag_name().name().to_string());

        let positions: Vec<u8> = arg_nodes
            .iter()
            .map(|n| n.tag_name().name().bytes().last().unwrap() - b'0')
            .sorted()
            .collect();
        if !matches!(positions.as_slice(), [] | [1] | [1, 2] | [1, 2, 3]) {
            return Err(IngestError::MalformedArgumentShape(order));
        }

        let mut args = Vec::with_capacity(arg_nodes.len());
        for node in &arg_nodes {
            let position = node.tag_name().name().bytes().last().unwrap() - b'0';
            let xml_type = node
                .attribute("type")
                .ok_or(IngestError::MissingArgType(order, position))?;
            let text = node.text().unwrap_or("");
            args.push(Argument::new(order, position, xml_type, text)?);
        }
        args.sort_by_key(|a| a.position);

        instructions.push(Instruction { order, opcode, args });
    }

    instructions.sort_by_key(|i| i.order);
    Ok(instructions)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_simple_program() {
        let xml = r#"
            <program language="IPPcode22">
                <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@a</arg1></instruction>
                <instruction order="2" opcode="MOVE">
                    <arg1 type="var">GF@a</arg1>
                    <arg2 type="int">42</arg2>
                </instruction>
            </program>
        "#;
        let instrs = parse(xml).unwrap();
        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0].opcode, Opcode::Defvar);
        assert_eq!(instrs[1].opcode, Opcode::Move);
    }

    #[test]
    fn test_order_independent_of_document_order() {
        let xml = r#"
            <program language="IPPcode22">
                <instruction order="5" opcode="DEFVAR"><arg1 type="var">GF@a</arg1></instruction>
                <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@b</arg1></instruction>
            </program>
        "#;
        let instrs = parse(xml).unwrap();
        assert_eq!(instrs[0].order, 1);
        assert_eq!(instrs[1].order, 5);
    }

    #[test]
    fn test_malformed_xml_is_31() {
        let err = parse("<program language=\"IPPcode22\">").unwrap_err();
        assert_eq!(err.exit_code(), 31);
    }

    #[test]
    fn test_wrong_root_tag_is_32() {
        let err = parse(r#"<notprogram language="IPPcode22"></notprogram>"#).unwrap_err();
        assert_eq!(err.exit_code(), 32);
    }

    #[test]
    fn test_wrong_language_is_32() {
        let err = parse(r#"<program language="brainfuck"></program>"#).unwrap_err();
        assert_eq!(err.exit_code(), 32);
    }

    #[test]
    fn test_duplicate_order_is_32() {
        let xml = r#"
            <program language="IPPcode22">
                <instruction order="1" opcode="CREATEFRAME"></instruction>
                <instruction order="1" opcode="CREATEFRAME"></instruction>
            </program>
        "#;
        let err = parse(xml).unwrap_err();
        assert_eq!(err.exit_code(), 32);
    }

    #[test]
    fn test_unknown_opcode_is_32() {
        let xml = r#"<program language="IPPcode22"><instruction order="1" opcode="FROBNICATE"></instruction></program>"#;
        let err = parse(xml).unwrap_err();
        assert_eq!(err.exit_code(), 32);
    }

    #[test]
    fn test_case_insensitive_opcode_and_language() {
        let xml = r#"<program language="ippcode22"><instruction order="1" opcode="createframe"></instruction></program>"#;
        let instrs = parse(xml).unwrap();
        assert_eq!(instrs[0].opcode, Opcode::Createframe);
    }
}
