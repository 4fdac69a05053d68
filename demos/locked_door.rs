/// Locked Door example: authors a small story through the editing API,
/// then plays it with a fixed script of choices.
///
/// Shows leaf-line authoring, defaults, instant leaves that jump before
/// the player sees anything, and undo.
///
/// Run with: cargo run --example locked_door

use branch_engine::core::session::{PlayStatus, PlayView, StorySession};
use branch_engine::schema::story::NodeId;

fn main() {
    let mut session = StorySession::builder()
        .seed(1984)
        .build()
        .expect("Failed to build session");

    // --- Author the story ---
    let hall = session.add_node();
    let desk = session.add_node();
    let door = session.add_node();
    let outside = session.add_node();

    session
        .update_node(
            hall,
            "A dusty hall. You have {coins} coins.",
            "# entry bookkeeping\n\
             @visits+=1\n\
             Search the desk | 2\n\
             Try the door | 3\n\
             Wait around | 1 | visits<3 | coins+=1",
        )
        .expect("hall");
    session
        .update_node(
            desk,
            "The desk drawer sticks.",
            "Force it | 1 | | once:add_item:key; coins+=2\n\
             Leave it | 1",
        )
        .expect("desk");
    session
        .update_node(
            door,
            "A heavy door.",
            "@if(has_key):<goto:4>\n\
             Unlock it | 4 | has_item:key | consume(key:opened=1)\n\
             Back to the hall | 1",
        )
        .expect("door");
    session
        .update_node(outside, "Daylight. You escape with {coins} coins.", "")
        .expect("outside");

    session.apply_defaults_text("coins=0\nhas_key=false");

    // A stray edit, undone.
    session.add_node();
    session.undo();
    assert_eq!(session.node_ids(), vec![hall, desk, door, outside]);

    println!("Hall options:\n{}\n", session.options_text(hall).unwrap_or_default());

    let issues = session.validate();
    println!("Lint: {} issues", issues.len());
    for issue in &issues {
        println!("  {}", issue);
    }

    // --- Play ---
    println!("\n=== Play-through ===\n");
    let mut view = session.start_play().expect("Failed to start play");
    show(&view);

    for pick in [0, 0, 1, 0] {
        if view.status != PlayStatus::Active {
            break;
        }
        println!("> {}", view.choices[pick].text);
        view = session.choose(pick).expect("Failed to choose");
        show(&view);
    }

    let path: Vec<String> = view.path.iter().map(NodeId::to_string).collect();
    println!("\nPath: {}", path.join(" -> "));
    for (name, value) in session.vars().iter() {
        println!("  {} = {}", name, value);
    }
}

fn show(view: &PlayView) {
    println!("{}", view.header);
    match view.status {
        PlayStatus::Active => {
            for (n, choice) in view.choices.iter().enumerate() {
                println!("  [{}] {}", n, choice.text);
            }
        }
        PlayStatus::Ended => println!("  [THE END]"),
        PlayStatus::DeadEnd(node) => println!("  [DEAD END] node {} not found", node),
    }
    println!();
}
