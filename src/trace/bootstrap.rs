//! Instrumentation Bootstrap
//!
//! Python program passed to the interpreter with `-c`. It reads the sandbox policy from the
//! environment, installs a `sys.addaudithook` hook and then executes the target script as
//! `__main__` with `sys.argv = [script, *args]`.
//!
//! The hook reports through raw writes to file descriptor 2, so a script that replaces
//! `sys.stderr` cannot hide its events. Field values have `,`, `|` and line breaks replaced by
//! spaces to keep every event on one well-formed protocol line.
//!
//! | Audit event | Trace event |
//! |-------------|-------------|
//! | `open` (read mode) | `file_read` (interpreter-internal paths skipped) |
//! | `open` (write/append/create mode) | `file_write`, blocked when file writes are disallowed |
//! | `os.remove`, `os.rmdir`, `shutil.rmtree` | `file_delete`, blocked likewise |
//! | `subprocess.Popen`, `os.system`, `os.exec`, `os.posix_spawn`, `os.spawn` | `process_spawn` |
//! | `socket.connect` | `network_connect`, blocked when network is disallowed |
//! | `socket.sendto`, `socket.sendmsg` | `network_send`, blocked likewise |
//! | `import` (first per top-level module) | `module_import` |

pub const BOOTSTRAP: &str = r#"
import os
import sys


def _scr_main():
    marker = "SCR_TRACE:"
    tracing = os.environ.get("SCR_TRACE_MODE") == "1"
    no_network = os.environ.get("SCR_NO_NETWORK") == "1"
    no_file_write = os.environ.get("SCR_NO_FILE_WRITE") == "1"

    if len(sys.argv) < 2:
        os.write(2, b"scr bootstrap: missing script path\n")
        sys.exit(2)
    sys.argv = sys.argv[1:]
    script = os.path.abspath(sys.argv[0])

    with open(script, "rb") as handle:
        source = handle.read()
    code = compile(source, script, "exec")
    sys.path.insert(0, os.path.dirname(script))

    internal = tuple(
        p for p in {sys.prefix, sys.base_prefix, sys.exec_prefix, sys.base_exec_prefix} if p
    )
    quiet_suffixes = (".py", ".pyc", ".pyd", ".so", ".pth")
    write_flags = os.O_WRONLY | os.O_RDWR | os.O_APPEND | os.O_CREAT | os.O_TRUNC
    seen_modules = set()
    state = {"active": False}

    def clean(value):
        text = str(value)
        for ch in (",", "|", "\n", "\r"):
            text = text.replace(ch, " ")
        return text

    def emit(event_type, **fields):
        if not tracing:
            return
        body = ",".join("%s=%s" % (k, clean(v)) for k, v in fields.items())
        line = "%s%s|%s\n" % (marker, event_type, body)
        try:
            os.write(2, line.encode("utf-8", "replace"))
        except OSError:
            pass

    def is_write(mode, flags):
        if isinstance(mode, str) and any(c in mode for c in "wax+"):
            return True
        return isinstance(flags, int) and flags & write_flags != 0

    def is_internal(path):
        text = os.fsdecode(path) if isinstance(path, (str, bytes)) else ""
        if not text:
            return True
        if text.endswith(quiet_suffixes):
            return True
        return bool(internal) and os.path.abspath(text).startswith(internal)

    def address_fields(address):
        if isinstance(address, tuple) and len(address) >= 2:
            return {"addr": address[0], "port": address[1]}
        return {"addr": address}

    def hook(event, args):
        if state["active"]:
            return
        state["active"] = True
        try:
            if event == "open":
                path, mode, flags = (tuple(args) + (None, None, None))[:3]
                if not isinstance(path, (str, bytes, os.PathLike)):
                    return
                path = os.fsdecode(os.fspath(path))
                if is_write(mode, flags):
                    if no_file_write:
                        emit("file_write", file=path, blocked=1)
                        raise PermissionError("File write blocked by sandbox: %s" % path)
                    emit("file_write", file=path)
                elif not is_internal(path):
                    emit("file_read", file=path)
            elif event in ("os.remove", "os.rmdir", "shutil.rmtree"):
                path = os.fsdecode(os.fspath(args[0])) if args else "unknown"
                if no_file_write:
                    emit("file_delete", file=path, blocked=1)
                    raise PermissionError("File delete blocked by sandbox: %s" % path)
                emit("file_delete", file=path)
            elif event == "subprocess.Popen":
                emit("process_spawn", cmd=args[1] if len(args) > 1 else args[0], pid=os.getpid())
            elif event in ("os.system", "os.exec", "os.posix_spawn", "os.spawn"):
                emit("process_spawn", cmd=args[0] if args else "unknown", pid=os.getpid())
            elif event == "socket.connect":
                fields = address_fields(args[1] if len(args) > 1 else "unknown")
                if no_network:
                    emit("network_connect", blocked=1, **fields)
                    raise PermissionError("Network access blocked by sandbox")
                emit("network_connect", **fields)
            elif event in ("socket.sendto", "socket.sendmsg"):
                fields = address_fields(args[1] if len(args) > 1 else "unknown")
                if no_network:
                    emit("network_send", blocked=1, **fields)
                    raise PermissionError("Network access blocked by sandbox")
                emit("network_send", **fields)
            elif event == "import":
                top = str(args[0]).split(".")[0] if args else ""
                if top and top not in seen_modules:
                    seen_modules.add(top)
                    emit("module_import", module=top)
        finally:
            state["active"] = False

    sys.addaudithook(hook)
    namespace = {"__name__": "__main__", "__file__": script, "__builtins__": __builtins__}
    exec(code, namespace)


_scr_main()
"#;
