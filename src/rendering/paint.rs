/// Display list built from a laid-out region

use crate::rendering::layout::{LayoutKind, LayoutTree};
use image::{Rgb, RgbaImage};
use std::sync::Arc;

const INK: (u8, u8, u8, u8) = (0, 0, 0, 255);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: (u8, u8, u8, u8),
    },
    StrokeRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        thickness: u32,
        rgba: (u8, u8, u8, u8),
    },
    Text {
        x: i32,
        y: i32,
        lines: Vec<String>,
        size: u32,
        rgba: (u8, u8, u8, u8),
    },
    Image {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        image: Arc<RgbaImage>,
    },
}

/// Background first, then nodes in layout order.
pub fn build_display_list(tree: &LayoutTree, background: Rgb<u8>) -> Vec<PaintCommand> {
    let [r, g, b] = background.0;
    let mut commands = Vec::with_capacity(tree.nodes.len() + 1);
    commands.push(PaintCommand::SolidRect {
        x: 0,
        y: 0,
        width: tree.width,
        height: tree.height,
        rgba: (r, g, b, 255),
    });

    for node in &tree.nodes {
        let rect = &node.rect;
        commands.push(match &node.kind {
            LayoutKind::Text { lines, size } => PaintCommand::Text {
                x: rect.x,
                y: rect.y,
                lines: lines.clone(),
                size: *size,
                rgba: INK,
            },
            LayoutKind::Border { thickness } => PaintCommand::StrokeRect {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                thickness: *thickness,
                rgba: INK,
            },
            LayoutKind::Image { image } => PaintCommand::Image {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                image: Arc::clone(image),
            },
        });
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::layout::{LayoutNode, Rect};

    #[test]
    fn background_is_painted_first() {
        let tree = LayoutTree {
            width: 10,
            height: 20,
            nodes: vec![LayoutNode {
                rect: Rect { x: 1, y: 2, width: 3, height: 4 },
                kind: LayoutKind::Border { thickness: 2 },
            }],
        };
        let cmds = build_display_list(&tree, Rgb([255, 255, 255]));
        assert_eq!(cmds.len(), 2);
        assert_eq!(
            cmds[0],
            PaintCommand::SolidRect { x: 0, y: 0, width: 10, height: 20, rgba: (255, 255, 255, 255) }
        );
        match &cmds[1] {
            PaintCommand::StrokeRect { thickness, width, .. } => {
                assert_eq!(*thickness, 2);
                assert_eq!(*width, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
