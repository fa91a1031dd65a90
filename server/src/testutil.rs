//! Shared fixtures for server tests.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::events::{Event, Publisher};

/// Writes a shell script that speaks just enough UCI for tests. It
/// remembers the side to move from the last `position fen` line and
/// replies to `go` with a legal opening move for that side.
pub fn fake_engine() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake-engine");
    std::fs::write(
        &path,
        concat!(
            "#!/bin/sh\n",
            "side=w\n",
            "black_replies=0\n",
            "while read -r line; do\n",
            "  case \"$line\" in\n",
            "    uci) echo \"id name fake\"; echo uciok ;;\n",
            "    isready) echo readyok ;;\n",
            "    position*)\n",
            "      case \"$line\" in\n",
            "        *\" b \"*) side=b ;;\n",
            "        *) side=w ;;\n",
            "      esac ;;\n",
            "    go*)\n",
            "      if [ \"$side\" = w ]; then\n",
            "        echo \"bestmove e2e4 ponder e7e5\"\n",
            "      elif [ \"$black_replies\" -eq 0 ]; then\n",
            "        black_replies=1; echo \"bestmove e7e5\"\n",
            "      else\n",
            "        echo \"bestmove g8f6\"\n",
            "      fi ;;\n",
            "    quit) exit 0 ;;\n",
            "  esac\n",
            "done\n",
        ),
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    (dir, path)
}

/// Wildcard-subscribes a channel onto the bus, capturing every event
/// published after this call.
pub fn collect_events(publisher: &Arc<Publisher>) -> mpsc::Receiver<Event> {
    let (tx, rx) = mpsc::channel(64);
    publisher.subscribe_all(move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event).await;
        }
    });
    rx
}
